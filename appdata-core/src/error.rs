//! Error types for AppData operations

use thiserror::Error;

/// Local cache storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Cache transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupt cache entry for {partition}/{document_id}: {reason}")]
    CorruptEntry {
        partition: String,
        document_id: String,
        reason: String,
    },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Transport failures that never produced an HTTP status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Caller input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown partition: {value}")]
    UnknownPartition { value: String },
}

/// Master error type carried by document wrappers and pages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("Token exchange failed for partition {partition}: {reason}")]
    Auth {
        partition: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Permission denied: cannot {operation} in partition {partition}")]
    Permission { partition: String, operation: String },

    #[error("Document not found: {partition}/{document_id}")]
    NotFound {
        partition: String,
        document_id: String,
    },

    #[error("Conflict on {partition}/{document_id} (status {status}): {message}")]
    Conflict {
        partition: String,
        document_id: String,
        status: u16,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Data service is disabled")]
    ServiceDisabled,

    #[error("No more pages available")]
    NoMorePages,

    #[error("Unexpected HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Flat discriminant of [`DataError`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataErrorKind {
    Auth,
    Permission,
    NotFound,
    Conflict,
    Transport,
    Serialization,
    ServiceDisabled,
    NoMorePages,
    Http,
    Storage,
    Config,
    Validation,
}

impl DataError {
    /// Build a serialization error from any displayable decode failure.
    pub fn serialization(reason: impl std::fmt::Display) -> Self {
        DataError::Serialization {
            reason: reason.to_string(),
        }
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> DataErrorKind {
        match self {
            DataError::Auth { .. } => DataErrorKind::Auth,
            DataError::Permission { .. } => DataErrorKind::Permission,
            DataError::NotFound { .. } => DataErrorKind::NotFound,
            DataError::Conflict { .. } => DataErrorKind::Conflict,
            DataError::Transport(_) => DataErrorKind::Transport,
            DataError::Serialization { .. } => DataErrorKind::Serialization,
            DataError::ServiceDisabled => DataErrorKind::ServiceDisabled,
            DataError::NoMorePages => DataErrorKind::NoMorePages,
            DataError::Http { .. } => DataErrorKind::Http,
            DataError::Storage(_) => DataErrorKind::Storage,
            DataError::Config(_) => DataErrorKind::Config,
            DataError::Validation(_) => DataErrorKind::Validation,
        }
    }

    /// Whether retrying the same call later could succeed.
    ///
    /// Retry policy itself belongs to the caller or the transport.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::Transport(_) => true,
            DataError::Http { status, .. } => *status == 429 || *status >= 500,
            DataError::Auth {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(e: serde_json::Error) -> Self {
        DataError::serialization(e)
    }
}

/// Result type alias for AppData operations.
pub type DataResult<T> = Result<T, DataError>;

// =============================================================================
// TESTS
// =============================================================================
