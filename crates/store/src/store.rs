//! View store trait and SQLite implementation.

use crate::error::StoreResult;
use crate::models::{ArchivedDailyViewRow, DailyViewRow};
use crate::repos::{ArchiveRepo, ArchiveStats, ViewRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tally_core::DomainKey;
use time::Date;
use tokio::sync::Mutex;

/// Combined view store trait.
#[async_trait]
pub trait ViewStore: ViewRepo + ArchiveRepo + Send + Sync {
    /// Create schema objects if they do not already exist. Safe to invoke
    /// repeatedly across restarts.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}

/// SQLite-backed view store.
///
/// The live database holds `daily_views` and `total_views`. A separate
/// archive database, attached to every pooled connection as `archive`,
/// holds `archived_daily_views`; attaching lets an archival run copy and
/// delete within one transaction.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    /// Serializes all write transactions (view increments and archival
    /// runs). Readers use the pool directly and run concurrently under
    /// WAL.
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open the live and archive databases, creating files, parent
    /// directories and schema as needed.
    pub async fn new(
        path: impl AsRef<Path>,
        archive_path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> StoreResult<Self> {
        let path = path.as_ref();
        let archive_path = archive_path.as_ref();

        for db_path in [path, archive_path] {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(busy_timeout);

        let attach_path = archive_path.display().to_string();
        let pool = SqlitePoolOptions::new()
            // SQLite permits one writer at a time; the write lock serializes
            // writers and WAL lets the remaining connections serve reads.
            .max_connections(4)
            .after_connect(move |conn, _meta| {
                let attach_path = attach_path.clone();
                Box::pin(async move {
                    sqlx::query("ATTACH DATABASE ? AS archive")
                        .bind(attach_path)
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl ViewStore for SqliteStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS daily_views (
                domain TEXT NOT NULL,
                date TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (domain, date)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS total_views (
                domain TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        // Range-scanned daily statistics look up by domain; archival
        // sweeps look up by date.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_daily_domain ON daily_views(domain)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_daily_date ON daily_views(date)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS archive.archived_daily_views (
                domain TEXT NOT NULL,
                date TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (domain, date)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ViewRepo for SqliteStore {
    async fn record_view(&self, domain: &DomainKey, date: Date) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO daily_views (domain, date, count)
             VALUES (?, ?, 1)
             ON CONFLICT(domain, date) DO UPDATE SET count = count + 1",
        )
        .bind(domain.as_str())
        .bind(date)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO total_views (domain, count)
             VALUES (?, 1)
             ON CONFLICT(domain) DO UPDATE SET count = count + 1",
        )
        .bind(domain.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_total(&self, domain: &DomainKey) -> StoreResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT count FROM total_views WHERE domain = ?")
            .bind(domain.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(count,)| count).unwrap_or(0))
    }

    async fn get_daily_range(
        &self,
        domain: &DomainKey,
        start: Date,
        end: Date,
    ) -> StoreResult<Vec<DailyViewRow>> {
        let rows = sqlx::query_as::<_, DailyViewRow>(
            "SELECT domain, date, count FROM daily_views
             WHERE domain = ? AND date >= ? AND date <= ?
             ORDER BY date ASC",
        )
        .bind(domain.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ArchiveRepo for SqliteStore {
    async fn archive_before(&self, cutoff: Date) -> StoreResult<ArchiveStats> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        // Copy first, then delete; a failure in either statement rolls
        // back the whole run. Rows already present in the archive are
        // left untouched.
        sqlx::query(
            "INSERT INTO archive.archived_daily_views (domain, date, count)
             SELECT domain, date, count FROM daily_views WHERE date < ?
             ON CONFLICT(domain, date) DO NOTHING",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM daily_views WHERE date < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ArchiveStats {
            rows_archived: deleted.rows_affected(),
        })
    }

    async fn get_archived_range(
        &self,
        domain: &DomainKey,
        start: Date,
        end: Date,
    ) -> StoreResult<Vec<ArchivedDailyViewRow>> {
        let rows = sqlx::query_as::<_, ArchivedDailyViewRow>(
            "SELECT domain, date, count FROM archive.archived_daily_views
             WHERE domain = ? AND date >= ? AND date <= ?
             ORDER BY date ASC",
        )
        .bind(domain.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
