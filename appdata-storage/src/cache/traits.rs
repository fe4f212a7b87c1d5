//! Cache backend trait and statistics.

use async_trait::async_trait;
use appdata_core::{DataResult, Partition, Timestamp};

use super::entry::CacheEntry;
use super::key::DocumentKey;

/// Cache backend trait for pluggable storage of cache entries.
///
/// Backends store and return raw entries; expiry policy is applied by
/// [`super::LocalDocumentCache`]. Implementations must be safe under
/// concurrent use and give per-key atomicity without serializing
/// unrelated keys behind one lock.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Get the raw entry for a key, expired or not.
    async fn get(&self, key: &DocumentKey) -> DataResult<Option<CacheEntry>>;

    /// Store or overwrite the entry for a key.
    async fn put(&self, key: &DocumentKey, entry: CacheEntry) -> DataResult<()>;

    /// Remove the entry for a key. Returns whether one existed.
    async fn delete(&self, key: &DocumentKey) -> DataResult<bool>;

    /// Atomically remove the entry for a key if it is expired at `now`.
    ///
    /// A concurrent `put` of a fresh entry must never be removed by this.
    async fn delete_if_expired(&self, key: &DocumentKey, now: Timestamp) -> DataResult<bool>;

    /// Remove every entry in a partition.
    async fn invalidate_partition(&self, partition: Partition) -> DataResult<u64>;

    /// Remove every entry expired at `now`.
    async fn purge_expired(&self, now: Timestamp) -> DataResult<u64>;

    /// Remove the entry that expires soonest (infinite entries last).
    async fn evict_one(&self) -> DataResult<Option<DocumentKey>>;

    /// Remove everything.
    async fn clear(&self) -> DataResult<u64>;

    /// Number of stored entries, expired ones included.
    async fn len(&self) -> DataResult<u64>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of entries dropped because they expired.
    pub expirations: u64,
    /// Number of entries dropped to respect the capacity bound.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
