//! Cache time-to-live policy.

use crate::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// No expiration on cache.
pub const TIME_TO_LIVE_INFINITE: i64 = -1;

/// Do not cache.
pub const TIME_TO_LIVE_NO_CACHE: i64 = 0;

/// Default expiration on cache (one day).
pub const TIME_TO_LIVE_DEFAULT: i64 = 60 * 60 * 24;

/// How long a document stays valid in the local cache.
///
/// Serializes to the integer-seconds form: `-1` infinite, `0` no-cache,
/// positive values expire after that many seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum TimeToLive {
    /// Never expires.
    Infinite,
    /// Bypass the cache entirely; existing entries are evicted on write.
    NoCache,
    /// Expires the given number of seconds after it was written.
    Seconds(u64),
}

impl TimeToLive {
    /// Parse the integer-seconds form.
    pub fn from_seconds(seconds: i64) -> Result<Self, ConfigError> {
        match seconds {
            TIME_TO_LIVE_INFINITE => Ok(TimeToLive::Infinite),
            TIME_TO_LIVE_NO_CACHE => Ok(TimeToLive::NoCache),
            s if s > 0 => Ok(TimeToLive::Seconds(s as u64)),
            s => Err(ConfigError::InvalidValue {
                field: "cache_time_to_live".to_string(),
                value: s.to_string(),
                reason: "must be -1 (infinite), 0 (no cache) or a positive number of seconds"
                    .to_string(),
            }),
        }
    }

    /// The integer-seconds form.
    pub fn as_seconds(&self) -> i64 {
        match self {
            TimeToLive::Infinite => TIME_TO_LIVE_INFINITE,
            TimeToLive::NoCache => TIME_TO_LIVE_NO_CACHE,
            TimeToLive::Seconds(s) => i64::try_from(*s).unwrap_or(i64::MAX),
        }
    }

    /// Whether entries written under this policy are stored at all.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, TimeToLive::NoCache)
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, TimeToLive::Infinite)
    }

    /// Expiry instant for an entry written at `written_at`.
    ///
    /// `None` means the entry never expires. No-cache entries expire at the
    /// instant they are written.
    pub fn expires_at(&self, written_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeToLive::Infinite => None,
            TimeToLive::NoCache => Some(written_at),
            TimeToLive::Seconds(s) => {
                let secs = i64::try_from(*s).unwrap_or(i64::MAX);
                Some(
                    chrono::Duration::try_seconds(secs)
                        .and_then(|d| written_at.checked_add_signed(d))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                )
            }
        }
    }
}

impl Default for TimeToLive {
    fn default() -> Self {
        TimeToLive::Seconds(TIME_TO_LIVE_DEFAULT as u64)
    }
}

impl TryFrom<i64> for TimeToLive {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_seconds(value)
    }
}

impl From<TimeToLive> for i64 {
    fn from(ttl: TimeToLive) -> Self {
        ttl.as_seconds()
    }
}
