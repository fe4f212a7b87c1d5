//! Document wrapper and page types returned to callers.
//!
//! Every operation hands back a typed wrapper whose state the caller
//! branches on; errors travel inside the wrapper instead of beside it.

use crate::{DataError, DataResult, Partition, Timestamp};
use serde::{de::DeserializeOwned, Serialize};

/// Marker trait for document payload types.
///
/// Any `serde` type that can cross threads qualifies; the blanket impl
/// means callers never implement it by hand.
pub trait SerializableDocument: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> SerializableDocument for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// What a wrapper holds: a document, a confirmed deletion, or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState<T> {
    /// The document payload.
    Present(T),
    /// The document was deleted successfully; there is no payload.
    Deleted,
    /// The operation failed.
    Failed(DataError),
}

/// One document plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrapper<T> {
    partition: Partition,
    document_id: String,
    etag: Option<String>,
    last_updated: Option<Timestamp>,
    from_cache: bool,
    pending_write: bool,
    state: DocumentState<T>,
}

impl<T> DocumentWrapper<T> {
    /// A payload-bearing wrapper.
    pub fn new(
        partition: Partition,
        document_id: impl Into<String>,
        value: T,
        etag: Option<String>,
        last_updated: Option<Timestamp>,
    ) -> Self {
        Self {
            partition,
            document_id: document_id.into(),
            etag,
            last_updated,
            from_cache: false,
            pending_write: false,
            state: DocumentState::Present(value),
        }
    }

    /// A wrapper confirming a successful delete.
    pub fn deleted(partition: Partition, document_id: impl Into<String>) -> Self {
        Self {
            partition,
            document_id: document_id.into(),
            etag: None,
            last_updated: None,
            from_cache: false,
            pending_write: false,
            state: DocumentState::Deleted,
        }
    }

    /// A wrapper carrying an error.
    pub fn failed(partition: Partition, document_id: impl Into<String>, error: DataError) -> Self {
        Self {
            partition,
            document_id: document_id.into(),
            etag: None,
            last_updated: None,
            from_cache: false,
            pending_write: false,
            state: DocumentState::Failed(error),
        }
    }

    /// Mark this wrapper as served from the local cache.
    pub fn with_cache_origin(mut self, pending_write: bool) -> Self {
        self.from_cache = true;
        self.pending_write = pending_write;
        self
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }

    /// Whether this wrapper was served without a network call.
    ///
    /// A cache hit carries the same partition, id, payload, ETag and
    /// last-updated time as the remote read that filled the cache; only
    /// this flag differs.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Whether the cached state was written locally and not yet confirmed.
    pub fn is_pending_write(&self) -> bool {
        self.pending_write
    }

    pub fn state(&self) -> &DocumentState<T> {
        &self.state
    }

    pub fn value(&self) -> Option<&T> {
        match &self.state {
            DocumentState::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DataError> {
        match &self.state {
            DocumentState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.state, DocumentState::Failed(_))
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.state, DocumentState::Deleted)
    }

    pub fn into_value(self) -> Option<T> {
        match self.state {
            DocumentState::Present(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a `Result` for callers that prefer `?`.
    ///
    /// `Ok(None)` is a successful delete.
    pub fn into_result(self) -> DataResult<Option<T>> {
        match self.state {
            DocumentState::Present(value) => Ok(Some(value)),
            DocumentState::Deleted => Ok(None),
            DocumentState::Failed(error) => Err(error),
        }
    }

    /// Map the payload to a new type, keeping metadata.
    pub fn map<U, F>(self, f: F) -> DocumentWrapper<U>
    where
        F: FnOnce(T) -> U,
    {
        let state = match self.state {
            DocumentState::Present(value) => DocumentState::Present(f(value)),
            DocumentState::Deleted => DocumentState::Deleted,
            DocumentState::Failed(error) => DocumentState::Failed(error),
        };
        DocumentWrapper {
            partition: self.partition,
            document_id: self.document_id,
            etag: self.etag,
            last_updated: self.last_updated,
            from_cache: self.from_cache,
            pending_write: self.pending_write,
            state,
        }
    }
}

/// One page of a partition listing.
///
/// A page either holds documents in listing order or a page-level error.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    items: Vec<DocumentWrapper<T>>,
    error: Option<DataError>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<DocumentWrapper<T>>) -> Self {
        Self { items, error: None }
    }

    /// A page representing a failed fetch.
    pub fn failed(error: DataError) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
        }
    }

    pub fn items(&self) -> &[DocumentWrapper<T>] {
        &self.items
    }

    pub fn error(&self) -> Option<&DataError> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<DocumentWrapper<T>> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_present_wrapper() {
        let now = Utc::now();
        let doc = DocumentWrapper::new(
            Partition::User,
            "doc1",
            42u32,
            Some("etag-1".to_string()),
            Some(now),
        );
        assert!(doc.is_success());
        assert!(!doc.is_deleted());
        assert!(!doc.from_cache());
        assert_eq!(doc.value(), Some(&42));
        assert!(doc.error().is_none());
        assert_eq!(doc.etag(), Some("etag-1"));
        assert_eq!(doc.last_updated(), Some(now));
        assert_eq!(doc.into_result(), Ok(Some(42)));
    }

    #[test]
    fn test_failed_wrapper_has_no_value() {
        let doc: DocumentWrapper<u32> =
            DocumentWrapper::failed(Partition::ReadOnly, "doc1", DataError::ServiceDisabled);
        assert!(!doc.is_success());
        assert!(doc.value().is_none());
        assert_eq!(doc.error(), Some(&DataError::ServiceDisabled));
        assert_eq!(doc.into_result(), Err(DataError::ServiceDisabled));
    }

    #[test]
    fn test_deleted_wrapper() {
        let doc: DocumentWrapper<u32> = DocumentWrapper::deleted(Partition::User, "gone");
        assert!(doc.is_success());
        assert!(doc.is_deleted());
        assert!(doc.value().is_none());
        assert_eq!(doc.into_result(), Ok(None));
    }

    #[test]
    fn test_cache_origin_and_map() {
        let doc = DocumentWrapper::new(Partition::User, "doc1", 2u32, None, None)
            .with_cache_origin(false)
            .map(|v| v.to_string());
        assert!(doc.from_cache());
        assert!(!doc.is_pending_write());
        assert_eq!(doc.value().map(String::as_str), Some("2"));
    }

    #[test]
    fn test_page_shapes() {
        let page = Page::new(vec![DocumentWrapper::new(
            Partition::User,
            "a",
            1u8,
            None,
            None,
        )]);
        assert_eq!(page.len(), 1);
        assert!(!page.is_error());

        let failed: Page<u8> = Page::failed(DataError::NoMorePages);
        assert!(failed.is_empty());
        assert_eq!(failed.error(), Some(&DataError::NoMorePages));
    }
}
