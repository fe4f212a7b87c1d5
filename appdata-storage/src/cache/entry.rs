//! Cache entries and their expiry rules.

use appdata_core::{TimeToLive, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the cached state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheOrigin {
    /// Confirmed by the remote store.
    Remote,
    /// Written locally and not yet confirmed remotely.
    LocalPending,
}

/// The last known state of one document.
///
/// The payload is kept as JSON so one cache can hold documents of any type;
/// it is decoded into the caller's type on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Document payload in its wire representation.
    pub document: serde_json::Value,
    /// Remote version token.
    pub etag: Option<String>,
    /// Remote last-modified timestamp.
    pub last_updated: Option<Timestamp>,
    /// When this entry was written to the cache.
    pub cached_at: Timestamp,
    /// When this entry stops being served. `None` never expires.
    pub expires_at: Option<Timestamp>,
    pub origin: CacheOrigin,
}

impl CacheEntry {
    /// Create a remote-origin entry written at `cached_at` under `ttl`.
    pub fn new(
        document: serde_json::Value,
        etag: Option<String>,
        last_updated: Option<Timestamp>,
        cached_at: Timestamp,
        ttl: TimeToLive,
    ) -> Self {
        Self {
            document,
            etag,
            last_updated,
            cached_at,
            expires_at: ttl.expires_at(cached_at),
            origin: CacheOrigin::Remote,
        }
    }

    pub fn with_origin(mut self, origin: CacheOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Whether the entry is past its expiry at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.origin == CacheOrigin::LocalPending
    }

    /// Sort key for capacity eviction: soonest expiry first, infinite last.
    pub(crate) fn eviction_rank(&self) -> DateTime<Utc> {
        self.expires_at.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(ttl: TimeToLive, at: Timestamp) -> CacheEntry {
        CacheEntry::new(json!({"a": 1}), Some("e".to_string()), None, at, ttl)
    }

    #[test]
    fn test_finite_expiry_boundary() {
        let t0 = Utc::now();
        let e = entry(TimeToLive::Seconds(60), t0);
        assert!(!e.is_expired(t0 + chrono::Duration::seconds(59)));
        assert!(e.is_expired(t0 + chrono::Duration::seconds(60)));
        assert!(e.is_expired(t0 + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_infinite_never_expires() {
        let t0 = Utc::now();
        let e = entry(TimeToLive::Infinite, t0);
        assert!(!e.is_expired(t0 + chrono::Duration::days(365 * 100)));
        assert_eq!(e.expires_at, None);
    }

    #[test]
    fn test_origin() {
        let e = entry(TimeToLive::default(), Utc::now());
        assert_eq!(e.origin, CacheOrigin::Remote);
        assert!(!e.is_pending());
        assert!(e.with_origin(CacheOrigin::LocalPending).is_pending());
    }
}
