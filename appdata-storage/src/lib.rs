//! AppData Storage - Local Document Cache
//!
//! TTL cache of document state with an in-memory backend for the common
//! case and an LMDB backend for caches that outlive the process.

pub mod cache;

pub use cache::{
    CacheBackend, CacheConfig, CacheEntry, CacheOrigin, CacheStats, DocumentKey,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError, LocalDocumentCache,
};
