//! Request-to-domain resolution.
//!
//! Precedence: `Referer` (scheme+host, when trusted) -> `X-Real-Host` ->
//! the request's own `Host` header. The result is normalized (lowercase,
//! port stripped) before it reaches the store.

use axum::http::HeaderMap;
use axum::http::header::{HOST, REFERER};
use tally_core::DomainKey;

/// Header set by reverse proxies carrying the original request host.
const X_REAL_HOST: &str = "x-real-host";

/// Resolve the counted domain for a request.
///
/// With `trust_referer` set, a parseable `Referer` wins so that a page on
/// another site embedding the counter attributes views to the referring
/// host. Returns `None` when no header yields a usable hostname.
pub fn resolve_domain(headers: &HeaderMap, trust_referer: bool) -> Option<DomainKey> {
    if trust_referer
        && let Some(referer) = headers.get(REFERER)
        && let Ok(value) = referer.to_str()
        && let Some(key) = DomainKey::from_referer(value)
    {
        return Some(key);
    }

    let host = headers
        .get(X_REAL_HOST)
        .or_else(|| headers.get(HOST))
        .and_then(|value| value.to_str().ok())?;
    DomainKey::from_host(host)
}
