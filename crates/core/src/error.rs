//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
