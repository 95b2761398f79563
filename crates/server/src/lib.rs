//! HTTP API server for the tally view counter.
//!
//! This crate provides the HTTP surface and the background machinery:
//! - View recording and aggregate read endpoints
//! - Request-to-domain resolution
//! - Per-IP rate limiting
//! - Prometheus metrics
//! - Scheduled archival of old daily rows

pub mod archiver;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use archiver::Archiver;
pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use state::AppState;
