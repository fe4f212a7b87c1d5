//! Per-call read and write options.

use crate::{ConfigError, TimeToLive};
use serde::{Deserialize, Serialize};

/// Options for reading and caching a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// How long the fetched document stays in the local cache.
    pub cache_time_to_live: TimeToLive,
}

impl ReadOptions {
    pub fn new(cache_time_to_live: TimeToLive) -> Self {
        Self { cache_time_to_live }
    }

    /// Build from the integer-seconds TTL form (`-1`, `0` or positive).
    pub fn with_time_to_live(seconds: i64) -> Result<Self, ConfigError> {
        Ok(Self::new(TimeToLive::from_seconds(seconds)?))
    }

    /// Read options that never consult or populate the cache.
    pub fn no_cache() -> Self {
        Self::new(TimeToLive::NoCache)
    }
}

/// Options for writing or deleting a document.
///
/// Writes are unconditional unless an ETag precondition is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Only apply the write if the remote document still has this ETag.
    pub if_match: Option<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the remote document to carry `etag` for the write to apply.
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.if_match.is_some()
    }
}
