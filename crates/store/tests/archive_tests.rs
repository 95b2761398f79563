//! Archival integration tests.

use std::sync::Arc;
use std::time::Duration;
use tally_core::DomainKey;
use tally_store::{ArchiveRepo, SqliteStore, ViewRepo};
use tempfile::tempdir;
use time::macros::date;

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

fn domain(raw: &str) -> DomainKey {
    DomainKey::from_host(raw).unwrap()
}

#[tokio::test]
async fn archive_moves_only_rows_before_cutoff() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    store.record_view(&key, date!(2024 - 01 - 01)).await.unwrap();
    store.record_view(&key, date!(2024 - 01 - 05)).await.unwrap();
    store.record_view(&key, date!(2024 - 01 - 06)).await.unwrap();
    store.record_view(&key, date!(2024 - 01 - 10)).await.unwrap();

    let stats = store.archive_before(date!(2024 - 01 - 06)).await.unwrap();
    assert_eq!(stats.rows_archived, 2);

    // Rows at or after the cutoff stay live.
    let live = store
        .get_daily_range(&key, date!(2024 - 01 - 01), date!(2024 - 01 - 31))
        .await
        .unwrap();
    let live_dates: Vec<_> = live.iter().map(|r| r.date).collect();
    assert_eq!(live_dates, vec![date!(2024 - 01 - 06), date!(2024 - 01 - 10)]);

    let archived = store
        .get_archived_range(&key, date!(2024 - 01 - 01), date!(2024 - 01 - 31))
        .await
        .unwrap();
    let archived_dates: Vec<_> = archived.iter().map(|r| r.date).collect();
    assert_eq!(
        archived_dates,
        vec![date!(2024 - 01 - 01), date!(2024 - 01 - 05)]
    );
}

#[tokio::test]
async fn archived_rows_keep_their_counts() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    for _ in 0..7 {
        store.record_view(&key, date!(2024 - 01 - 02)).await.unwrap();
    }

    store.archive_before(date!(2024 - 02 - 01)).await.unwrap();

    let archived = store
        .get_archived_range(&key, date!(2024 - 01 - 01), date!(2024 - 01 - 31))
        .await
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].count, 7);
    assert_eq!(archived[0].domain, "example.com");
}

#[tokio::test]
async fn archival_never_changes_totals() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    for _ in 0..5 {
        store.record_view(&key, date!(2024 - 01 - 02)).await.unwrap();
    }
    for _ in 0..3 {
        store.record_view(&key, date!(2024 - 03 - 02)).await.unwrap();
    }
    let before = store.get_total(&key).await.unwrap();

    store.archive_before(date!(2024 - 02 - 01)).await.unwrap();

    assert_eq!(store.get_total(&key).await.unwrap(), before);

    // The total still covers both live and archived history.
    let live_sum: i64 = store
        .get_daily_range(&key, date!(2024 - 01 - 01), date!(2024 - 12 - 31))
        .await
        .unwrap()
        .iter()
        .map(|r| r.count)
        .sum();
    assert_eq!(live_sum, 3);
    assert!(before >= live_sum);
}

#[tokio::test]
async fn rerun_is_a_noop_on_already_archived_rows() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    store.record_view(&key, date!(2024 - 01 - 01)).await.unwrap();
    store.record_view(&key, date!(2024 - 01 - 01)).await.unwrap();

    let first = store.archive_before(date!(2024 - 02 - 01)).await.unwrap();
    assert_eq!(first.rows_archived, 1);

    let second = store.archive_before(date!(2024 - 02 - 01)).await.unwrap();
    assert_eq!(second.rows_archived, 0);

    let archived = store
        .get_archived_range(&key, date!(2024 - 01 - 01), date!(2024 - 01 - 31))
        .await
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].count, 2);
}

#[tokio::test]
async fn failed_copy_leaves_live_rows_untouched() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    store.record_view(&key, date!(2024 - 01 - 01)).await.unwrap();
    store.record_view(&key, date!(2024 - 01 - 02)).await.unwrap();

    // Sabotage the copy target so the INSERT half of the run fails.
    sqlx::query("DROP TABLE archive.archived_daily_views")
        .execute(store.pool())
        .await
        .unwrap();

    let result = store.archive_before(date!(2024 - 02 - 01)).await;
    assert!(result.is_err());

    // The whole run rolled back: nothing was deleted.
    let live = store
        .get_daily_range(&key, date!(2024 - 01 - 01), date!(2024 - 01 - 31))
        .await
        .unwrap();
    assert_eq!(live.len(), 2);
    assert_eq!(store.get_total(&key).await.unwrap(), 2);
}

#[tokio::test]
async fn cutoff_is_exclusive() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    store.record_view(&key, date!(2024 - 01 - 06)).await.unwrap();

    // A row exactly at the cutoff date is not archived.
    let stats = store.archive_before(date!(2024 - 01 - 06)).await.unwrap();
    assert_eq!(stats.rows_archived, 0);

    let live = store
        .get_daily_range(&key, date!(2024 - 01 - 06), date!(2024 - 01 - 06))
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn views_recorded_after_archival_start_fresh_daily_rows() {
    let temp = tempdir().unwrap();
    let store = open_store(&temp).await;
    let key = domain("example.com");

    store.record_view(&key, date!(2024 - 01 - 01)).await.unwrap();
    store.archive_before(date!(2024 - 02 - 01)).await.unwrap();

    // New views for an archived date create a fresh live row; the next
    // archival run merges nothing (archive row already exists) but still
    // clears the live one.
    store.record_view(&key, date!(2024 - 01 - 01)).await.unwrap();
    let live = store
        .get_daily_range(&key, date!(2024 - 01 - 01), date!(2024 - 01 - 01))
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].count, 1);

    assert_eq!(store.get_total(&key).await.unwrap(), 2);
}
