//! TTL document cache in front of a pluggable backend.
//!
//! `LocalDocumentCache` owns the expiry policy: backends hand back raw
//! entries and this layer decides whether an entry is still servable,
//! evicting expired ones lazily on read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use appdata_core::{
    Clock, DataError, DataResult, DocumentState, DocumentWrapper, Partition, StorageError,
    SystemClock, TimeToLive,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheOrigin};
use super::key::DocumentKey;
use super::memory_backend::InMemoryCacheBackend;
use super::traits::{CacheBackend, CacheStats};

/// Configuration for the local document cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Upper bound on stored entries. `None` leaves eviction to TTL alone.
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of stored entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}

/// Local TTL cache of document state keyed by (partition, document id).
///
/// # Example
///
/// ```ignore
/// let cache = LocalDocumentCache::in_memory();
/// cache.put(&wrapper, TimeToLive::Seconds(60)).await?;
/// let cached = cache.get_document::<Profile>(Partition::User, "profile").await?;
/// ```
pub struct LocalDocumentCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for LocalDocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocumentCache")
            .field("backend", &self.backend.name())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}

impl LocalDocumentCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            backend,
            clock,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// An unbounded in-memory cache on the system clock.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryCacheBackend::new()),
            Arc::new(SystemClock),
            CacheConfig::default(),
        )
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the servable entry for a document.
    ///
    /// Returns `None` if nothing is stored or the stored entry has expired.
    /// Expired entries are removed on the way out.
    pub async fn get(&self, partition: Partition, document_id: &str) -> DataResult<Option<CacheEntry>> {
        let key = DocumentKey::new(partition, document_id);
        let now = self.clock.now();

        let Some(entry) = self.backend.get(&key).await? else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(partition = %partition, document_id, "cache miss");
            return Ok(None);
        };

        if entry.is_expired(now) {
            // A fresh entry written since our read is left in place.
            if self.backend.delete_if_expired(&key, now).await? {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(partition = %partition, document_id, "cache entry expired");
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(partition = %partition, document_id, "cache hit");
        Ok(Some(entry))
    }

    /// Get a servable document decoded into `T`.
    ///
    /// An entry that no longer decodes as `T` is dropped and reported as
    /// [`StorageError::CorruptEntry`].
    pub async fn get_document<T: DeserializeOwned>(
        &self,
        partition: Partition,
        document_id: &str,
    ) -> DataResult<Option<DocumentWrapper<T>>> {
        let Some(entry) = self.get(partition, document_id).await? else {
            return Ok(None);
        };

        let pending = entry.is_pending();
        match serde_json::from_value::<T>(entry.document) {
            Ok(value) => Ok(Some(
                DocumentWrapper::new(
                    partition,
                    document_id,
                    value,
                    entry.etag,
                    entry.last_updated,
                )
                .with_cache_origin(pending),
            )),
            Err(e) => {
                warn!(
                    partition = %partition,
                    document_id,
                    error = %e,
                    "Dropping cache entry that does not decode"
                );
                self.invalidate(partition, document_id).await?;
                Err(DataError::Storage(StorageError::CorruptEntry {
                    partition: partition.to_string(),
                    document_id: document_id.to_string(),
                    reason: e.to_string(),
                }))
            }
        }
    }

    /// Store the state carried by `document` under `ttl`.
    ///
    /// - `Present` documents are stored, overwriting any previous entry.
    /// - `Deleted` documents remove the entry.
    /// - `Failed` wrappers leave the cache untouched.
    ///
    /// A `NoCache` TTL removes any existing entry and stores nothing.
    pub async fn put<T: Serialize>(&self, document: &DocumentWrapper<T>, ttl: TimeToLive) -> DataResult<()> {
        self.put_with_origin(document, ttl, CacheOrigin::Remote).await
    }

    /// Store a locally written document that the remote store has not confirmed.
    pub async fn put_pending<T: Serialize>(
        &self,
        document: &DocumentWrapper<T>,
        ttl: TimeToLive,
    ) -> DataResult<()> {
        self.put_with_origin(document, ttl, CacheOrigin::LocalPending)
            .await
    }

    async fn put_with_origin<T: Serialize>(
        &self,
        document: &DocumentWrapper<T>,
        ttl: TimeToLive,
        origin: CacheOrigin,
    ) -> DataResult<()> {
        let partition = document.partition();
        let document_id = document.document_id();

        let value = match document.state() {
            DocumentState::Present(value) => value,
            DocumentState::Deleted => {
                self.invalidate(partition, document_id).await?;
                return Ok(());
            }
            DocumentState::Failed(_) => return Ok(()),
        };

        if !ttl.is_cacheable() {
            self.invalidate(partition, document_id).await?;
            return Ok(());
        }

        let payload = serde_json::to_value(value)?;
        let entry = CacheEntry::new(
            payload,
            document.etag().map(str::to_string),
            document.last_updated(),
            self.clock.now(),
            ttl,
        )
        .with_origin(origin);

        let key = DocumentKey::new(partition, document_id);
        self.backend.put(&key, entry).await?;
        debug!(partition = %partition, document_id, ttl = ttl.as_seconds(), "cached document");

        self.enforce_capacity().await
    }

    /// Remove a document unconditionally. Returns whether one was stored.
    pub async fn invalidate(&self, partition: Partition, document_id: &str) -> DataResult<bool> {
        let key = DocumentKey::new(partition, document_id);
        self.backend.delete(&key).await
    }

    /// Remove every document in a partition.
    pub async fn invalidate_partition(&self, partition: Partition) -> DataResult<u64> {
        let removed = self.backend.invalidate_partition(partition).await?;
        debug!(partition = %partition, removed, "invalidated partition");
        Ok(removed)
    }

    /// Remove every expired entry.
    pub async fn purge_expired(&self) -> DataResult<u64> {
        let removed = self.backend.purge_expired(self.clock.now()).await?;
        self.expirations.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    /// Remove everything.
    pub async fn clear(&self) -> DataResult<u64> {
        self.backend.clear().await
    }

    pub async fn stats(&self) -> DataResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.backend.len().await?,
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }

    async fn enforce_capacity(&self) -> DataResult<()> {
        let Some(max) = self.config.max_entries else {
            return Ok(());
        };

        while self.backend.len().await? > max as u64 {
            match self.backend.evict_one().await? {
                Some(key) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "evicted cache entry over capacity");
                }
                None => break,
            }
        }
        Ok(())
    }
}
