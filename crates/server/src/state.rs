//! Application state shared across handlers.

use crate::ratelimit::RateLimitState;
use std::sync::Arc;
use std::time::Duration;
use tally_core::AppConfig;
use tally_store::ViewStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// View store.
    pub store: Arc<dyn ViewStore>,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
}

impl AppState {
    /// Create a new application state.
    ///
    /// This validates configuration and logs warnings for risky settings.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit or archive configuration is invalid.
    pub fn new(config: AppConfig, store: Arc<dyn ViewStore>) -> Self {
        match config.rate_limit.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("Configuration warning: {}", warning);
                }
            }
            Err(error) => {
                panic!("Invalid rate limit configuration: {}", error);
            }
        }

        if let Err(error) = config.archive.validate() {
            panic!("Invalid archive configuration: {}", error);
        }

        let rate_limit = RateLimitState::new(&config.rate_limit);

        Self {
            config: Arc::new(config),
            store,
            rate_limit,
        }
    }

    /// Get the cleanup interval for the rate limiter, if enabled.
    /// Returns None when rate limiting is disabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if self.rate_limit.is_enabled() {
            Some(Duration::from_secs(
                self.config.rate_limit.cleanup_interval_secs,
            ))
        } else {
            None
        }
    }
}
