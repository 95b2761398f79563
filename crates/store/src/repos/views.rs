//! View counting repository.

use crate::error::StoreResult;
use crate::models::DailyViewRow;
use async_trait::async_trait;
use tally_core::DomainKey;
use time::Date;

/// Repository for recording views and reading aggregates.
#[async_trait]
pub trait ViewRepo: Send + Sync {
    /// Record one view for `domain` on `date`.
    ///
    /// Upserts the daily row and the total row in a single transaction:
    /// either both counters advance by one or neither does. Write
    /// transactions are serialized by the store's write lock, so
    /// concurrent callers never lose increments.
    ///
    /// Callers pass the current UTC calendar date; two views straddling
    /// midnight UTC land in different daily buckets.
    async fn record_view(&self, domain: &DomainKey, date: Date) -> StoreResult<()>;

    /// All-time view count for `domain`.
    ///
    /// A domain with no recorded views reads as 0; absence is not an
    /// error. Does not take the write lock.
    async fn get_total(&self, domain: &DomainKey) -> StoreResult<i64>;

    /// Daily rows for `domain` with dates in `[start, end]` inclusive,
    /// ordered ascending by date. Empty when nothing matches. Does not
    /// take the write lock.
    async fn get_daily_range(
        &self,
        domain: &DomainKey,
        start: Date,
        end: Date,
    ) -> StoreResult<Vec<DailyViewRow>>;
}
