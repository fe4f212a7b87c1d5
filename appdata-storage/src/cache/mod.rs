//! Local TTL document cache.
//!
//! Backends store raw [`CacheEntry`] records keyed by [`DocumentKey`];
//! [`LocalDocumentCache`] layers the expiry policy, capacity bound and
//! statistics on top and hands callers owned, decoded wrappers.
//!
//! # Partition Isolation
//!
//! A [`DocumentKey`] cannot be built without a partition, and its encoded
//! form starts with the partition, so the same document id in two
//! partitions maps to two distinct entries.

pub mod entry;
pub mod key;
pub mod lmdb_backend;
pub mod local;
pub mod memory_backend;
pub mod traits;

pub use entry::{CacheEntry, CacheOrigin};
pub use key::DocumentKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use local::{CacheConfig, LocalDocumentCache};
pub use memory_backend::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats};
