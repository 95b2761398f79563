//! Store error types.

use thiserror::Error;

/// View store operation errors.
///
/// Any I/O or constraint failure surfaces here with the triggering
/// transaction rolled back; partial writes are never silently kept.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
