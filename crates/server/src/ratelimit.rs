//! Per-IP rate limiting middleware using a keyed token bucket.
//!
//! One bucket per client IP. Memory stays bounded:
//! - Configurable maximum tracked IPs (default: 100,000); new IPs are
//!   rejected while at capacity
//! - TTL-based eviction of idle entries by a background cleanup task
//!
//! # Security Note
//!
//! X-Forwarded-For and X-Real-IP headers are NOT trusted by default.
//! Configure `trusted_proxies` to enable header-based IP detection:
//!
//! - Empty list (default): only the direct connection IP is used
//! - List of IPs/CIDRs: headers trusted only from these addresses
//! - ["*"]: trust headers from all sources (development only)

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
};
use ipnet::IpNet;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use tally_core::config::RateLimitConfig;

/// Type alias for the keyed per-IP rate limiter.
type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Minimum number of evictions before the governor map is rebuilt.
/// Rebuilding resets in-flight rate-limit state, so small cleanups skip it.
const REBUILD_EVICTION_MIN_COUNT: usize = 100;

/// Maximum time between rebuilds once evictions have occurred; the
/// fallback path for reclaiming memory when churn stays below the count
/// threshold.
const REBUILD_MIN_INTERVAL: Duration = Duration::from_secs(300);

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

/// Inner state, only allocated when rate limiting is enabled.
struct RateLimitStateInner {
    /// Keyed limiter (RwLock so cleanup can rebuild it to reclaim memory;
    /// governor's internal map does not support key removal).
    limiter: RwLock<KeyedLimiter>,
    /// Last access timestamps per IP, for TTL eviction.
    last_access: DashMap<String, Instant>,
    /// Trusted proxy configuration.
    trusted_proxies: TrustedProxies,
    /// Maximum entries before rejecting new IPs.
    max_entries: u32,
    /// Time-to-live for idle entries.
    entry_ttl: Duration,
    /// Whether the ConnectInfo-missing warning has fired.
    connect_info_warned: AtomicBool,
    /// Whether the at-capacity warning has fired (prevents log spam).
    at_capacity_warned: AtomicBool,
    /// Quota kept around for rebuilding.
    quota: Quota,
    /// Timestamp of the last limiter rebuild.
    last_rebuild: RwLock<Instant>,
}

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Trusted proxy configuration for IP extraction.
#[derive(Clone, Debug)]
enum TrustedProxies {
    /// Never trust forwarded headers (default).
    None,
    /// Trust headers from all sources (development only).
    All,
    /// Trust headers only from specific IPs/CIDRs.
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            Self::None
        } else if proxies.len() == 1 && proxies[0] == "*" {
            Self::All
        } else {
            let entries: Vec<TrustedEntry> = proxies
                .iter()
                .filter_map(|p| {
                    if p.contains('/') {
                        match p.parse::<IpNet>() {
                            Ok(net) => Some(TrustedEntry::Cidr(net)),
                            Err(e) => {
                                tracing::warn!("Invalid CIDR in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    } else {
                        match p.parse::<IpAddr>() {
                            Ok(ip) => Some(TrustedEntry::Ip(ip)),
                            Err(e) => {
                                tracing::warn!("Invalid IP in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    }
                })
                .collect();
            Self::List(entries)
        }
    }

    /// Check if the given connection IP is a trusted proxy.
    fn is_trusted(&self, connection_ip: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => {
                let ip: IpAddr = match connection_ip.parse() {
                    Ok(ip) => ip,
                    Err(_) => return false,
                };
                entries.iter().any(|entry| match entry {
                    TrustedEntry::Ip(trusted) => *trusted == ip,
                    TrustedEntry::Cidr(network) => network.contains(&ip),
                })
            }
        }
    }
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        let trusted_proxies = TrustedProxies::from_config(&config.trusted_proxies);

        let quota =
            Quota::per_minute(NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN))
                .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));
        let limiter = RateLimiter::dashmap(quota);

        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                limiter: RwLock::new(limiter),
                last_access: DashMap::new(),
                trusted_proxies,
                max_entries: config.max_entries,
                entry_ttl: Duration::from_secs(config.entry_ttl_secs),
                connect_info_warned: AtomicBool::new(false),
                at_capacity_warned: AtomicBool::new(false),
                quota,
                last_rebuild: RwLock::new(Instant::now()),
            })),
        }
    }

    /// Check if a request from the given IP is allowed.
    pub fn check_ip(&self, ip: &str) -> Result<(), RateLimitError> {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return Ok(()),
        };

        let now = Instant::now();
        let ip_string = ip.to_string();

        // Capacity check before the entry lock; DashMap's len() can
        // deadlock when called while holding an entry lock. Slightly racy,
        // but the worst case is a brief overshoot of max_entries.
        let current_len = inner.last_access.len();
        let at_capacity = current_len >= inner.max_entries as usize;

        match inner.last_access.entry(ip_string.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                if at_capacity {
                    if !inner.at_capacity_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            current_entries = current_len,
                            max_entries = inner.max_entries,
                            "Rate limiter at capacity, rejecting new IPs until cleanup"
                        );
                    }
                    return Err(RateLimitError {
                        retry_after_secs: 60,
                        reason: RateLimitReason::AtCapacity,
                    });
                }
                entry.insert(now);
            }
        }

        let limiter = inner.limiter.read().unwrap_or_else(|poisoned| {
            tracing::warn!("rate limiter RwLock was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        });
        match limiter.check_key(&ip_string) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait_time =
                    not_until.wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
                Err(RateLimitError {
                    retry_after_secs: wait_time.as_secs() + 1,
                    reason: RateLimitReason::RateLimited,
                })
            }
        }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Evict entries idle past the TTL. Returns the number evicted.
    ///
    /// Eviction uses atomic `remove_if` so an entry refreshed between
    /// collection and removal survives. When enough entries leave, the
    /// governor limiter is rebuilt to release the memory its internal map
    /// never frees on its own.
    pub fn cleanup(&self) -> usize {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return 0,
        };

        let now = Instant::now();
        let ttl = inner.entry_ttl;
        let mut evicted = 0;

        let stale_keys: Vec<String> = inner
            .last_access
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        for key in stale_keys {
            if inner
                .last_access
                .remove_if(&key, |_, last_access| {
                    now.duration_since(*last_access) > ttl
                })
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            if self.should_rebuild(inner, evicted, now) {
                self.rebuild_limiter(inner, now);
                tracing::debug!(
                    evicted = evicted,
                    remaining = inner.last_access.len(),
                    "Rebuilt rate limiter after cleanup"
                );
            }
            inner.at_capacity_warned.store(false, Ordering::Relaxed);
            tracing::debug!(
                evicted = evicted,
                entries = inner.last_access.len(),
                "Rate limiter cleanup completed"
            );
        }

        evicted
    }

    /// A rebuild happens when eviction volume crosses the threshold or
    /// enough time has passed since the last rebuild.
    fn should_rebuild(&self, inner: &RateLimitStateInner, evicted: usize, now: Instant) -> bool {
        if evicted >= REBUILD_EVICTION_MIN_COUNT {
            return true;
        }
        let last = inner.last_rebuild.read().unwrap_or_else(|poisoned| {
            tracing::warn!("last_rebuild RwLock was poisoned, recovering");
            poisoned.into_inner()
        });
        now.duration_since(*last) >= REBUILD_MIN_INTERVAL
    }

    /// Replace the governor limiter with a fresh one. Active IPs lose
    /// their bucket state but stay tracked in `last_access`.
    fn rebuild_limiter(&self, inner: &RateLimitStateInner, now: Instant) {
        let new_limiter = RateLimiter::dashmap(inner.quota);
        let mut limiter = inner.limiter.write().unwrap_or_else(|poisoned| {
            tracing::warn!("rate limiter RwLock was poisoned during rebuild, recovering");
            poisoned.into_inner()
        });
        *limiter = new_limiter;

        let mut last_rebuild = inner.last_rebuild.write().unwrap_or_else(|poisoned| {
            tracing::warn!("last_rebuild RwLock was poisoned, recovering");
            poisoned.into_inner()
        });
        *last_rebuild = now;
    }

    /// Number of currently tracked IPs.
    pub fn entry_count(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.last_access.len(),
            None => 0,
        }
    }

    /// Log a warning if ConnectInfo is not available (only once).
    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting. All requests will share a single \
                 rate limit bucket ('unknown' IP). Add .into_make_service_with_connect_info::<SocketAddr>() \
                 to your server configuration to enable per-IP rate limiting."
            );
        }
    }
}

/// Reason for rate limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// Request exceeded the rate limit.
    RateLimited,
    /// Rate limiter at capacity, cannot track new IPs.
    AtCapacity,
}

/// Error returned when a request is rejected by the limiter.
#[derive(Debug)]
pub struct RateLimitError {
    /// Number of seconds to wait before retrying.
    pub retry_after_secs: u64,
    /// Reason for the rejection.
    pub reason: RateLimitReason,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let (code, message) = match self.reason {
            RateLimitReason::RateLimited => (
                "rate_limit_exceeded",
                format!(
                    "Rate limit exceeded. Retry after {} seconds.",
                    self.retry_after_secs
                ),
            ),
            RateLimitReason::AtCapacity => (
                "rate_limiter_at_capacity",
                "Server is experiencing high load. Please retry later.".to_string(),
            ),
        };

        let body = serde_json::json!({
            "code": code,
            "message": message,
            "retry_after": self.retry_after_secs,
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", self.retry_after_secs.to_string())],
            axum::Json(body),
        )
            .into_response()
    }
}

/// Extract client IP address from forwarded headers (only if trusted).
fn extract_forwarded_ip(req: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(s) = forwarded.to_str()
    {
        // First IP in the chain is the client.
        if let Some(ip) = s.split(',').next() {
            return Some(ip.trim().to_string());
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(s) = real_ip.to_str()
    {
        return Some(s.trim().to_string());
    }

    None
}

/// Extract connection IP from request extensions (set by ConnectInfo).
fn extract_connection_ip(req: &Request<Body>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Extract the client IP address for rate limiting.
///
/// Forwarded headers are only consulted when the direct connection comes
/// from a trusted proxy (or all proxies are trusted).
fn extract_ip(req: &Request<Body>, state: &RateLimitState) -> String {
    let inner = match &state.inner {
        Some(inner) => inner,
        None => return "unknown".to_string(),
    };

    let connection_ip = extract_connection_ip(req);

    let trust_headers = match (&connection_ip, &inner.trusted_proxies) {
        (None, TrustedProxies::All) => true,
        // Without a connection IP the proxy cannot be verified.
        (None, TrustedProxies::List(_)) => false,
        (None, TrustedProxies::None) => false,
        (Some(conn_ip), trusted_proxies) => trusted_proxies.is_trusted(conn_ip),
    };

    if trust_headers && let Some(forwarded_ip) = extract_forwarded_ip(req) {
        return forwarded_ip;
    }

    match connection_ip {
        Some(ip) => ip,
        None => {
            state.warn_connect_info_missing();
            "unknown".to_string()
        }
    }
}

/// Per-IP rate limiting middleware.
///
/// Applied as an outer layer so abusive clients are rejected before any
/// handler work happens.
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let ip = extract_ip(&req, &rate_limit);

    match rate_limit.check_ip(&ip) {
        Ok(_) => next.run(req).await,
        Err(e) => {
            crate::metrics::RATE_LIMITED.inc();
            e.into_response()
        }
    }
}

/// Spawn a background task that periodically evicts stale entries.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(
                    evicted = evicted,
                    "Rate limiter cleanup task evicted stale entries"
                );
            }
        }
    })
}
