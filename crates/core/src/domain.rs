//! Domain keys: normalized hostnames identifying a counted site.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized (lowercase, port-stripped) hostname.
///
/// Every aggregate is keyed by a `DomainKey`. Normalization happens here,
/// before any store access; the store trusts its input to already be
/// normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainKey(String);

impl DomainKey {
    /// Normalize a raw host value (e.g. a `Host` header) into a key.
    ///
    /// Anything after the first `/` or `:` is dropped, the rest is
    /// lowercased. Returns `None` when no hostname remains.
    pub fn from_host(raw: &str) -> Option<Self> {
        let host = raw.trim();
        let host = host.split('/').next().unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default();
        if host.is_empty() {
            return None;
        }
        Some(Self(host.to_ascii_lowercase()))
    }

    /// Derive a key from a `Referer`-style URL.
    ///
    /// Only `http://` and `https://` URLs are considered; anything else
    /// yields `None`.
    pub fn from_referer(referer: &str) -> Option<Self> {
        let rest = referer
            .trim()
            .strip_prefix("https://")
            .or_else(|| referer.trim().strip_prefix("http://"))?;
        Self::from_host(rest)
    }

    /// The normalized hostname as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
