//! Document Client
//!
//! Read, list, create, replace and delete documents. Reads go through the
//! local cache first; writes go to the remote store and update the cache
//! only once the store has accepted them.
//!
//! Every operation resolves to a [`DocumentWrapper`] (or a paginator whose
//! page carries the error) instead of a `Result`, so callers branch on the
//! wrapper state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use appdata_core::{
    Clock, DataConfig, DataError, DataResult, DocumentOperation, DocumentWrapper, Partition,
    ReadOptions, SerializableDocument, TimeToLive, ValidationError, WriteOptions,
};
use appdata_storage::LocalDocumentCache;
use tracing::{debug, info, warn};

use crate::paginator::PaginatedDocuments;
use crate::remote::{RemoteStore, WriteMode};
use crate::token::TokenResolver;
use crate::transport::Transport;

/// Client for one app's partitioned document store.
///
/// While disabled every operation fails with [`DataError::ServiceDisabled`]
/// before touching the cache or the network, including page fetches on
/// paginators handed out earlier.
pub struct DocumentClient {
    remote: Arc<RemoteStore>,
    cache: Arc<LocalDocumentCache>,
    default_ttl: TimeToLive,
    enabled: Arc<AtomicBool>,
}

impl DocumentClient {
    /// Build a client from its collaborators.
    ///
    /// `tokens` is shared so the owner can invalidate credentials on
    /// sign-out without going through the client.
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenResolver>,
        cache: Arc<LocalDocumentCache>,
        clock: Arc<dyn Clock>,
        config: &DataConfig,
    ) -> Self {
        Self {
            remote: Arc::new(RemoteStore::new(
                transport,
                tokens,
                clock,
                config.cosmos_api_version.clone(),
            )),
            cache,
            default_ttl: config.default_time_to_live,
            enabled: Arc::new(AtomicBool::new(config.enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled, "Data service enabled state changed");
        }
    }

    fn ensure_enabled(&self) -> DataResult<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(DataError::ServiceDisabled)
        }
    }

    pub fn cache(&self) -> &Arc<LocalDocumentCache> {
        &self.cache
    }

    pub fn tokens(&self) -> &Arc<TokenResolver> {
        self.remote.tokens()
    }

    /// Read a document, serving it from the cache while it is fresh.
    ///
    /// `options` of `None` applies the configured default TTL. A `NoCache`
    /// TTL skips the cache entirely and drops any stored copy. A remote
    /// failure is returned as is; an expired cached copy is never used as
    /// a fallback.
    pub async fn read<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        options: Option<ReadOptions>,
    ) -> DocumentWrapper<T> {
        let ttl = options
            .map(|options| options.cache_time_to_live)
            .unwrap_or(self.default_ttl);

        if let Err(e) = self.ensure_enabled().and_then(|()| validate_document_id(document_id)) {
            return DocumentWrapper::failed(partition, document_id, e);
        }

        if ttl.is_cacheable() {
            match self.cache.get_document::<T>(partition, document_id).await {
                Ok(Some(cached)) => return cached,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        partition = %partition,
                        document_id,
                        error = %e,
                        "Cache lookup failed, reading from remote"
                    );
                }
            }
        }

        match self.remote.read::<T>(partition, document_id).await {
            Ok(document) => {
                self.store(&document, ttl).await;
                document
            }
            Err(e) => {
                debug!(partition = %partition, document_id, error = %e, "read failed");
                DocumentWrapper::failed(partition, document_id, e)
            }
        }
    }

    /// List a partition, fetching the first page.
    ///
    /// Listing bypasses the per-document cache in both directions.
    pub async fn list<T: SerializableDocument>(&self, partition: Partition) -> PaginatedDocuments<T> {
        let remote = Arc::clone(&self.remote);
        let enabled = Arc::clone(&self.enabled);
        match self.ensure_enabled() {
            Ok(()) => PaginatedDocuments::first(remote, enabled, partition).await,
            Err(e) => PaginatedDocuments::failed(remote, enabled, partition, e),
        }
    }

    /// Create a document. Fails with a conflict if the id is taken.
    pub async fn create<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        document: T,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        self.write(
            DocumentOperation::Create,
            partition,
            document_id,
            document,
            options,
        )
        .await
    }

    /// Create or overwrite a document.
    ///
    /// With `options.if_match` set the write only applies while the remote
    /// document still carries that ETag.
    pub async fn replace<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        document: T,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        self.write(
            DocumentOperation::Replace,
            partition,
            document_id,
            document,
            options,
        )
        .await
    }

    /// Delete a document and drop its cached copy.
    pub async fn delete<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        if let Err(e) = self.check_write(DocumentOperation::Delete, partition, document_id) {
            return DocumentWrapper::failed(partition, document_id, e);
        }

        match self.remote.delete(partition, document_id, &options).await {
            Ok(()) => {
                let deleted = DocumentWrapper::deleted(partition, document_id);
                self.store(&deleted, self.default_ttl).await;
                debug!(partition = %partition, document_id, "deleted document");
                deleted
            }
            Err(e) => DocumentWrapper::failed(partition, document_id, e),
        }
    }

    async fn write<T: SerializableDocument>(
        &self,
        operation: DocumentOperation,
        partition: Partition,
        document_id: &str,
        document: T,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        if let Err(e) = self.check_write(operation, partition, document_id) {
            return DocumentWrapper::failed(partition, document_id, e);
        }

        let mode = match operation {
            DocumentOperation::Create => WriteMode::Create,
            _ => WriteMode::Upsert,
        };
        match self
            .remote
            .write(partition, document_id, &document, mode, &options)
            .await
        {
            Ok(stored) => {
                self.store(&stored, self.default_ttl).await;
                debug!(
                    partition = %partition,
                    document_id,
                    operation = %operation,
                    etag = stored.etag(),
                    "wrote document"
                );
                stored
            }
            Err(e) => DocumentWrapper::failed(partition, document_id, e),
        }
    }

    /// The single gate every write passes before any network call.
    fn check_write(
        &self,
        operation: DocumentOperation,
        partition: Partition,
        document_id: &str,
    ) -> DataResult<()> {
        self.ensure_enabled()?;
        partition.ensure_allowed(operation)?;
        validate_document_id(document_id)
    }

    /// Mirror a confirmed remote state into the cache.
    ///
    /// The remote write already happened, so a cache failure is only logged.
    async fn store<T: SerializableDocument>(&self, document: &DocumentWrapper<T>, ttl: TimeToLive) {
        if let Err(e) = self.cache.put(document, ttl).await {
            warn!(
                partition = %document.partition(),
                document_id = document.document_id(),
                error = %e,
                "Failed to update local cache"
            );
        }
    }
}

fn validate_document_id(document_id: &str) -> DataResult<()> {
    if document_id.is_empty() {
        return Err(DataError::Validation(ValidationError::RequiredFieldMissing {
            field: "document_id".to_string(),
        }));
    }
    Ok(())
}

impl std::fmt::Debug for DocumentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentClient")
            .field("remote", &self.remote)
            .field("cache", &self.cache)
            .field("default_ttl", &self.default_ttl)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
