//! SQLite-backed storage for the tally view counter.
//!
//! This crate owns the persistence layer:
//! - Live tables: per-domain daily counts and all-time totals
//! - A separate archive database for daily rows past retention
//! - The write-exclusivity lock serializing all write transactions

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use repos::{ArchiveRepo, ArchiveStats, ViewRepo};
pub use store::{SqliteStore, ViewStore};

use std::sync::Arc;
use tally_core::config::StoreConfig;

/// Create a view store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn ViewStore>> {
    config.validate().map_err(StoreError::Config)?;
    tracing::debug!(
        path = %config.path.display(),
        archive_path = %config.archive_path.display(),
        "Opening SQLite view store"
    );
    let store = SqliteStore::new(&config.path, &config.archive_path, config.busy_timeout()).await?;
    Ok(Arc::new(store) as Arc<dyn ViewStore>)
}
