//! In-memory cache backend on a sharded concurrent map.

use async_trait::async_trait;
use appdata_core::{DataResult, Partition, Timestamp};
use dashmap::DashMap;

use super::entry::CacheEntry;
use super::key::DocumentKey;
use super::traits::CacheBackend;

/// Process-local cache backend.
///
/// DashMap shards its locks by key hash, so writes to unrelated documents
/// do not contend and every single-key operation is atomic.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<DocumentKey, CacheEntry>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &DocumentKey) -> DataResult<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &DocumentKey, entry: CacheEntry) -> DataResult<()> {
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &DocumentKey) -> DataResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_if_expired(&self, key: &DocumentKey, now: Timestamp) -> DataResult<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some())
    }

    async fn invalidate_partition(&self, partition: Partition) -> DataResult<u64> {
        let mut removed = 0u64;
        self.entries.retain(|key, _| {
            let keep = key.partition() != partition;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn purge_expired(&self, now: Timestamp) -> DataResult<u64> {
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn evict_one(&self) -> DataResult<Option<DocumentKey>> {
        // Pick the victim first; removing while iterating would deadlock the shard.
        let victim = self
            .entries
            .iter()
            .min_by_key(|item| item.value().eviction_rank())
            .map(|item| item.key().clone());

        Ok(victim.filter(|key| self.entries.remove(key).is_some()))
    }

    async fn clear(&self) -> DataResult<u64> {
        let count = self.entries.len() as u64;
        self.entries.clear();
        Ok(count)
    }

    async fn len(&self) -> DataResult<u64> {
        Ok(self.entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appdata_core::TimeToLive;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn entry(ttl: TimeToLive, at: Timestamp) -> CacheEntry {
        CacheEntry::new(json!({"v": 1}), None, None, at, ttl)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = InMemoryCacheBackend::new();
        let key = DocumentKey::new(Partition::User, "a");
        let now = Utc::now();

        assert!(backend.get(&key).await.unwrap().is_none());
        backend.put(&key, entry(TimeToLive::Infinite, now)).await.unwrap();
        assert!(backend.get(&key).await.unwrap().is_some());
        assert!(backend.delete(&key).await.unwrap());
        assert!(!backend.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_expired_keeps_fresh_entries() {
        let backend = InMemoryCacheBackend::new();
        let key = DocumentKey::new(Partition::User, "a");
        let t0 = Utc::now();
        backend.put(&key, entry(TimeToLive::Seconds(10), t0)).await.unwrap();

        assert!(!backend.delete_if_expired(&key, t0).await.unwrap());
        assert!(backend
            .delete_if_expired(&key, t0 + chrono::Duration::seconds(11))
            .await
            .unwrap());
        assert_eq!(backend.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_partition_only_touches_that_partition() {
        let backend = InMemoryCacheBackend::new();
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            backend
                .put(&DocumentKey::new(Partition::User, id), entry(TimeToLive::Infinite, now))
                .await
                .unwrap();
        }
        backend
            .put(
                &DocumentKey::new(Partition::ReadOnly, "a"),
                entry(TimeToLive::Infinite, now),
            )
            .await
            .unwrap();

        assert_eq!(backend.invalidate_partition(Partition::User).await.unwrap(), 3);
        assert_eq!(backend.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evict_one_prefers_soonest_expiry() {
        let backend = InMemoryCacheBackend::new();
        let now = Utc::now();
        let forever = DocumentKey::new(Partition::User, "forever");
        let soon = DocumentKey::new(Partition::User, "soon");
        let later = DocumentKey::new(Partition::User, "later");
        backend.put(&forever, entry(TimeToLive::Infinite, now)).await.unwrap();
        backend.put(&soon, entry(TimeToLive::Seconds(5), now)).await.unwrap();
        backend.put(&later, entry(TimeToLive::Seconds(500), now)).await.unwrap();

        assert_eq!(backend.evict_one().await.unwrap(), Some(soon));
        assert_eq!(backend.evict_one().await.unwrap(), Some(later));
        assert_eq!(backend.evict_one().await.unwrap(), Some(forever));
        assert_eq!(backend.evict_one().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_distinct_keys() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..64 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                let key = DocumentKey::new(Partition::User, format!("doc-{}", i));
                backend.put(&key, entry(TimeToLive::Infinite, now)).await.unwrap();
                backend.get(&key).await.unwrap().is_some()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(backend.len().await.unwrap(), 64);
    }
}
