//! AppData Core - Document Types
//!
//! Pure data structures shared by the cache and the client: partitions,
//! TTL policy, per-call options, the document wrapper, pages, errors and
//! configuration. No I/O lives here.

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod options;
pub mod partition;
pub mod ttl;

pub use clock::{Clock, SystemClock};
pub use config::{DataConfig, DEFAULT_COSMOS_API_VERSION, DEFAULT_TOKEN_EXCHANGE_URL};
pub use document::{DocumentState, DocumentWrapper, Page, SerializableDocument};
pub use error::{
    ConfigError, DataError, DataErrorKind, DataResult, StorageError, TransportError,
    ValidationError,
};
pub use options::{ReadOptions, WriteOptions};
pub use partition::{
    DocumentOperation, Partition, APP_DOCUMENTS_PARTITION, USER_DOCUMENTS_PARTITION,
};
pub use ttl::{TimeToLive, TIME_TO_LIVE_DEFAULT, TIME_TO_LIVE_INFINITE, TIME_TO_LIVE_NO_CACHE};
