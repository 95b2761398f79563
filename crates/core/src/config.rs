//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// When enabled, restrict the endpoint to authorized scraper IPs at the
    /// infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// View store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Live database file path. Parent directories are created on startup.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Archive database file path. Holds daily rows moved out of the live
    /// database by the archiver.
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,
    /// SQLite busy timeout in seconds. Prevents transient "database is
    /// locked" errors under concurrent access.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/views.db")
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./data/archive.db")
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            archive_path: default_archive_path(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Get the busy timeout as a Duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.path == self.archive_path {
            return Err(
                "store.path and store.archive_path must be different files".to_string(),
            );
        }
        Ok(())
    }
}

/// Domain resolution configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Derive the counted domain from the `Referer` header when present
    /// (default: true). A page on another site embedding the counter then
    /// attributes its views to the referring host. Disable to count
    /// against `X-Real-Host`/`Host` only.
    #[serde(default = "default_trust_referer")]
    pub trust_referer: bool,
}

fn default_trust_referer() -> bool {
    true
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            trust_referer: default_trust_referer(),
        }
    }
}

/// Archival configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Enable the background archiver (default: true).
    #[serde(default = "default_archive_enabled")]
    pub enabled: bool,
    /// Interval in seconds between archival runs (default: 24 hours).
    #[serde(default = "default_archive_interval_secs")]
    pub interval_secs: u64,
    /// Retention window in days. Daily rows strictly older than
    /// `today - retention_days` are moved to the archive (default: 30).
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_archive_enabled() -> bool {
    true
}

fn default_archive_interval_secs() -> u64 {
    86400 // 24 hours
}

fn default_retention_days() -> u32 {
    30
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_archive_enabled(),
            interval_secs: default_archive_interval_secs(),
            retention_days: default_retention_days(),
        }
    }
}

impl ArchiveConfig {
    /// Get the run interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate archival configuration for dangerous settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.interval_secs == 0 {
            return Err("archive.interval_secs cannot be 0. \
                 This would cause a panic when creating the run timer. \
                 Use a value >= 1 second."
                .to_string());
        }
        Ok(())
    }
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default)]
    pub enabled: bool,
    /// Requests per minute per client IP.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Burst size (allows temporary bursts above the steady rate).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP
    /// headers trusted. If empty, forwarded headers are never trusted.
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of unique IPs to track before rejecting new entries
    /// (default: 100000). When the limit is reached, new IPs receive 429
    /// until cleanup runs.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Interval in seconds between cleanup sweeps of stale entries
    /// (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Time-to-live in seconds for rate limit entries (default: 300).
    /// Entries not accessed within this period are evicted during cleanup.
    /// Should be at least 2x the rate limit window.
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

fn default_requests_per_minute() -> u32 {
    60 // 1 request per second
}

fn default_burst_size() -> u32 {
    20
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_entry_ttl_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: default_requests_per_minute(),
            burst_size: default_burst_size(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration for dangerous settings.
    /// Returns warnings for configs that are insecure but allowed,
    /// and errors for configs that are unsafe and should be rejected.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0. \
                 This would cause a panic when creating the cleanup timer. \
                 Use a value >= 1 second."
                .to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 This allows clients to spoof their IP address and bypass rate limits. \
                 Only use this setting in development or behind a trusted reverse proxy."
                    .to_string(),
            );
        }

        if self.entry_ttl_secs < 120 {
            warnings.push(format!(
                "rate_limit.entry_ttl_secs={} is very short. \
                 Entries may be evicted before rate limits reset, \
                 allowing clients to bypass limits by waiting. \
                 Recommended minimum: 120 seconds.",
                self.entry_ttl_secs
            ));
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// View store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Domain resolution configuration.
    #[serde(default)]
    pub domain: DomainConfig,
    /// Archival configuration.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** The archiver is disabled so tests control
    /// archival explicitly; store paths still need to be pointed at a
    /// scratch directory.
    pub fn for_testing() -> Self {
        Self {
            archive: ArchiveConfig {
                enabled: false,
                ..ArchiveConfig::default()
            },
            ..Self::default()
        }
    }
}
