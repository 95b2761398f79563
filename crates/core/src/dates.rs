//! UTC calendar-date helpers.
//!
//! Daily aggregates are keyed by the UTC calendar date in `YYYY-MM-DD`
//! form. The format is zero-padded and year-first, so lexicographic
//! ordering over the stored TEXT column equals calendar ordering.

use crate::error::{Error, Result};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Current calendar date in UTC.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s, DATE_FORMAT).map_err(|_| Error::InvalidDate(s.to_string()))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}
