//! Scheduled archival of old daily view rows.
//!
//! A fixed-interval background task moves daily rows older than the
//! retention window into the archive database and deletes them from the
//! live table. Each run is all-or-nothing; a failed run is logged and the
//! next tick retries against whatever rows are still due. There is no
//! persisted partial-progress state.

use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tally_core::dates::today_utc;
use tally_store::{ArchiveRepo, ArchiveStats, StoreResult, ViewStore};
use time::Date;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background archiver for daily rows past the retention window.
pub struct Archiver {
    store: Arc<dyn ViewStore>,
    interval: Duration,
    retention_days: u32,
    shutdown: CancellationToken,
}

impl Archiver {
    /// Create a new archiver. Cancelling `shutdown` stops the spawned
    /// task at its next await point.
    pub fn new(
        store: Arc<dyn ViewStore>,
        interval: Duration,
        retention_days: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            interval,
            retention_days,
            shutdown,
        }
    }

    /// The cutoff for a run starting on `today`: rows strictly older than
    /// this date are moved.
    fn cutoff(&self, today: Date) -> Date {
        today.saturating_sub(time::Duration::days(i64::from(self.retention_days)))
    }

    /// Run a single archival pass. Totals are never touched.
    pub async fn run_once(&self) -> StoreResult<ArchiveStats> {
        let cutoff = self.cutoff(today_utc());
        self.store.archive_before(cutoff).await
    }

    /// Spawn the periodic task. The first run happens one full interval
    /// after startup.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval's first tick completes immediately; consume it so
            // the initial run waits one full period.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        tracing::info!("Archiver shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(stats) => {
                                metrics::ARCHIVE_RUNS.inc();
                                metrics::ARCHIVED_ROWS.inc_by(stats.rows_archived);
                                tracing::info!(
                                    rows_archived = stats.rows_archived,
                                    retention_days = self.retention_days,
                                    "Archival run completed"
                                );
                            }
                            Err(e) => {
                                metrics::ARCHIVE_FAILURES.inc();
                                tracing::error!(
                                    error = %e,
                                    "Archival run failed; next scheduled run will retry"
                                );
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::DomainKey;
    use tally_store::{SqliteStore, ViewRepo};
    use tempfile::tempdir;

    async fn open_store(temp: &tempfile::TempDir) -> Arc<SqliteStore> {
        Arc::new(
            SqliteStore::new(
                temp.path().join("views.db"),
                temp.path().join("archive.db"),
                Duration::from_secs(5),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn run_once_archives_rows_past_retention() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp).await;
        let key = DomainKey::from_host("example.com").unwrap();

        let today = today_utc();
        let old = today.saturating_sub(time::Duration::days(40));
        let recent = today.saturating_sub(time::Duration::days(3));

        store.record_view(&key, old).await.unwrap();
        store.record_view(&key, recent).await.unwrap();

        let archiver = Archiver::new(
            store.clone(),
            Duration::from_secs(3600),
            30,
            CancellationToken::new(),
        );
        let stats = archiver.run_once().await.unwrap();
        assert_eq!(stats.rows_archived, 1);

        let live = store.get_daily_range(&key, old, today).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].date, recent);

        let archived = store.get_archived_range(&key, old, today).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].date, old);

        // The all-time total covers archived history.
        assert_eq!(store.get_total(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cutoff_subtracts_retention_window() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp).await;
        let archiver = Archiver::new(
            store,
            Duration::from_secs(3600),
            7,
            CancellationToken::new(),
        );
        let today = time::macros::date!(2024 - 01 - 15);
        assert_eq!(archiver.cutoff(today), time::macros::date!(2024 - 01 - 08));
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp).await;
        let shutdown = CancellationToken::new();

        let archiver = Archiver::new(store, Duration::from_secs(3600), 30, shutdown.clone());
        let handle = archiver.spawn();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("archiver did not stop after cancellation")
            .unwrap();
    }
}
