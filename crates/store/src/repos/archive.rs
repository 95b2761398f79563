//! Archival repository.

use crate::error::StoreResult;
use crate::models::ArchivedDailyViewRow;
use async_trait::async_trait;
use tally_core::DomainKey;
use time::Date;

/// Statistics for a single archival run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveStats {
    /// Daily rows moved out of the live table.
    pub rows_archived: u64,
}

/// Repository for moving old daily rows into the archive database.
#[async_trait]
pub trait ArchiveRepo: Send + Sync {
    /// Move every live daily row with `date < cutoff` into the archive
    /// and delete it from the live table, in one transaction: a failure
    /// at any step rolls the whole run back, leaving the live table
    /// unchanged. Rows already present in the archive are left as-is, so
    /// re-runs are no-ops. Totals are never modified.
    async fn archive_before(&self, cutoff: Date) -> StoreResult<ArchiveStats>;

    /// Archived rows for `domain` with dates in `[start, end]` inclusive,
    /// ordered ascending by date.
    async fn get_archived_range(
        &self,
        domain: &DomainKey,
        start: Date,
        end: Date,
    ) -> StoreResult<Vec<ArchivedDailyViewRow>>;
}
