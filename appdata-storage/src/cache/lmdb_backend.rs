//! LMDB-backed cache backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached documents survive
//! process restarts. Keys are [`DocumentKey::encode`] bytes and values are
//! JSON-encoded [`CacheEntry`] records.
//!
//! # Atomicity
//!
//! LMDB allows one writer at a time. Every mutating operation, including
//! the conditional `delete_if_expired`, runs inside a single write
//! transaction, so a check and the delete it guards can never interleave
//! with another writer.

use std::path::Path;

use async_trait::async_trait;
use appdata_core::{DataError, DataResult, Partition, StorageError, Timestamp};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use super::entry::CacheEntry;
use super::key::DocumentKey;
use super::traits::CacheBackend;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for DataError {
    fn from(e: LmdbCacheError) -> Self {
        DataError::Storage(StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Persistent cache backend on an LMDB environment.
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheBackend")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbCacheBackend {
    /// Open (or create) a cache under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or LMDB refuses
    /// to open the environment.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this
        // process; callers must not open the same path twice concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db })
    }

    /// Collect the keys of every record matching `select`.
    ///
    /// Unreadable records are passed to `select` as `None`.
    fn collect_keys<F>(&self, txn: &RoTxn<'_>, mut select: F) -> Result<Vec<Vec<u8>>, LmdbCacheError>
    where
        F: FnMut(&[u8], Option<CacheEntry>) -> bool,
    {
        let mut keys = Vec::new();
        for result in self.db.iter(txn).map_err(txn_error)? {
            let (key, bytes) = result.map_err(txn_error)?;
            let entry = serde_json::from_slice::<CacheEntry>(bytes).ok();
            if select(key, entry) {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }

    /// Delete every record matching `select` in one write transaction.
    fn delete_matching<F>(&self, select: F) -> Result<u64, LmdbCacheError>
    where
        F: FnMut(&[u8], Option<CacheEntry>) -> bool,
    {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let keys = self.collect_keys(&wtxn, select)?;

        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn get(&self, key: &DocumentKey) -> DataResult<Option<CacheEntry>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let Some(bytes) = self.db.get(&rtxn, &key.encode()).map_err(txn_error)? else {
            return Ok(None);
        };

        serde_json::from_slice(bytes).map(Some).map_err(|e| {
            DataError::Storage(StorageError::CorruptEntry {
                partition: key.partition().to_string(),
                document_id: key.document_id().to_string(),
                reason: e.to_string(),
            })
        })
    }

    async fn put(&self, key: &DocumentKey, entry: CacheEntry) -> DataResult<()> {
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, &key.encode(), &bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn delete(&self, key: &DocumentKey) -> DataResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, &key.encode()).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn delete_if_expired(&self, key: &DocumentKey, now: Timestamp) -> DataResult<bool> {
        let encoded = key.encode();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        // Unreadable records are dropped along with expired ones.
        let expired = match self.db.get(&wtxn, &encoded).map_err(txn_error)? {
            Some(bytes) => serde_json::from_slice::<CacheEntry>(bytes)
                .map(|entry| entry.is_expired(now))
                .unwrap_or(true),
            None => false,
        };

        if !expired {
            return Ok(false);
        }

        let deleted = self.db.delete(&mut wtxn, &encoded).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn invalidate_partition(&self, partition: Partition) -> DataResult<u64> {
        let prefix = DocumentKey::partition_prefix(partition);
        Ok(self.delete_matching(|key, _| key.starts_with(&prefix))?)
    }

    async fn purge_expired(&self, now: Timestamp) -> DataResult<u64> {
        Ok(self.delete_matching(|_, entry| match entry {
            Some(entry) => entry.is_expired(now),
            None => true,
        })?)
    }

    async fn evict_one(&self) -> DataResult<Option<DocumentKey>> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let mut victim: Option<(Vec<u8>, Option<Timestamp>)> = None;
        for result in self.db.iter(&wtxn).map_err(txn_error)? {
            let (key, bytes) = result.map_err(txn_error)?;
            // Unreadable records rank ahead of everything else.
            let rank = serde_json::from_slice::<CacheEntry>(bytes)
                .ok()
                .map(|entry| entry.eviction_rank());
            let better = match &victim {
                None => true,
                Some((_, current)) => match (rank, current) {
                    (None, Some(_)) => true,
                    (Some(rank), Some(current)) => rank < *current,
                    _ => false,
                },
            };
            if better {
                victim = Some((key.to_vec(), rank));
            }
        }

        let Some((key, _)) = victim else {
            return Ok(None);
        };
        self.db.delete(&mut wtxn, &key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(DocumentKey::decode(&key))
    }

    async fn clear(&self) -> DataResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let count = self.db.len(&wtxn).map_err(txn_error)?;
        self.db.clear(&mut wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(count)
    }

    async fn len(&self) -> DataResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        Ok(self.db.len(&rtxn).map_err(txn_error)?)
    }
}
