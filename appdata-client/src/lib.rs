//! AppData Client - Document Access Core
//!
//! Typed CRUD and paginated listing against a partitioned, CosmosDB-style
//! document store. Credentials come from a token exchange service and are
//! cached per partition; documents are cached locally under a TTL policy.
//!
//! # Layers
//!
//! - [`DataService`]: enabled flag, lifecycle, completion-callback adapters
//! - [`DocumentClient`]: cache-first reads, remote writes, listing
//! - [`PaginatedDocuments`]: continuation-token cursor over a listing
//! - [`TokenResolver`]: single-flight per-partition token exchange
//! - [`Transport`]: the HTTP seam, with a `reqwest` implementation

pub mod client;
pub mod cosmos;
pub mod paginator;
mod remote;
pub mod service;
pub mod token;
pub mod transport;

pub use client::DocumentClient;
pub use paginator::{PaginatedDocuments, PaginatorState};
pub use service::{DataService, DataServiceBuilder};
pub use token::{TokenResolver, TokenResult, TOKEN_STATUS_SUCCEED};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

pub use appdata_core::{
    DataConfig, DataError, DataErrorKind, DataResult, DocumentState, DocumentWrapper, Page,
    Partition, ReadOptions, SerializableDocument, TimeToLive, WriteOptions,
    APP_DOCUMENTS_PARTITION, TIME_TO_LIVE_DEFAULT, TIME_TO_LIVE_INFINITE, TIME_TO_LIVE_NO_CACHE,
    USER_DOCUMENTS_PARTITION,
};
