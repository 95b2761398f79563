//! Database models mapping to the view count schema.

use sqlx::FromRow;
use time::Date;

/// Daily view count for one domain on one UTC calendar date.
///
/// At most one row exists per (domain, date) pair; `count` starts at 1 on
/// first insert and only ever increases.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DailyViewRow {
    pub domain: String,
    pub date: Date,
    pub count: i64,
}

/// All-time view count for one domain.
///
/// Never decremented, never deleted. Archival of daily rows does not
/// touch this table, so the total always covers archived history too.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TotalViewRow {
    pub domain: String,
    pub count: i64,
}

/// Archived daily view count, resident in the archive database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ArchivedDailyViewRow {
    pub domain: String,
    pub date: Date,
    pub count: i64,
}
