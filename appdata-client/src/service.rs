//! Data service lifecycle and public entry points.
//!
//! `DataService` owns the document client, whose enabled flag gates every
//! call. Besides native `async fn`s it offers `*_with_completion` adapters
//! that run the operation on the service's Tokio runtime and hand the
//! result to a callback exactly once.

use std::sync::Arc;

use appdata_core::{
    Clock, ConfigError, DataConfig, DataResult, DocumentWrapper, Partition, ReadOptions,
    SerializableDocument, SystemClock, WriteOptions,
};
use appdata_storage::{
    CacheBackend, CacheConfig, CacheStats, InMemoryCacheBackend, LocalDocumentCache,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::DocumentClient;
use crate::paginator::PaginatedDocuments;
use crate::token::TokenResolver;
use crate::transport::{ReqwestTransport, Transport};

struct ServiceInner {
    config: DataConfig,
    client: DocumentClient,
}

/// Entry point for document operations.
///
/// Cloning is cheap; clones share the client, caches and enabled flag.
#[derive(Clone)]
pub struct DataService {
    inner: Arc<ServiceInner>,
    runtime: Handle,
}

/// Builder for [`DataService`] with injectable collaborators.
///
/// # Example
///
/// ```ignore
/// let service = DataService::builder(DataConfig::from_env()?)
///     .with_transport(Arc::new(my_transport))
///     .build()?;
/// ```
pub struct DataServiceBuilder {
    config: DataConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    runtime: Option<Handle>,
}

impl DataServiceBuilder {
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a specific cache backend, e.g. an LMDB one.
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Runtime the completion adapters spawn on. Defaults to the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> DataResult<DataService> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| ConfigError::InvalidValue {
                field: "runtime".to_string(),
                value: "none".to_string(),
                reason: format!("no Tokio runtime available: {}", e),
            })?,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.config.request_timeout)?),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let backend: Arc<dyn CacheBackend> = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(InMemoryCacheBackend::new()));

        let mut cache_config = CacheConfig::new();
        if let Some(max) = self.config.max_cache_entries {
            cache_config = cache_config.with_max_entries(max);
        }
        let cache = Arc::new(LocalDocumentCache::new(backend, Arc::clone(&clock), cache_config));

        let tokens = Arc::new(TokenResolver::new(
            Arc::clone(&transport),
            Arc::clone(&clock),
            self.config.app_secret.clone(),
            self.config.token_exchange_url.clone(),
            self.config.token_refresh_skew,
        ));

        let client = DocumentClient::new(transport, tokens, cache, clock, &self.config);

        Ok(DataService {
            inner: Arc::new(ServiceInner {
                config: self.config,
                client,
            }),
            runtime,
        })
    }
}

impl DataService {
    pub fn builder(config: DataConfig) -> DataServiceBuilder {
        DataServiceBuilder {
            config,
            transport: None,
            clock: None,
            cache_backend: None,
            runtime: None,
        }
    }

    /// A service with the default transport, clock and in-memory cache.
    pub fn new(config: DataConfig) -> DataResult<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &DataConfig {
        &self.inner.config
    }

    /// The underlying client. It shares this service's enabled flag.
    pub fn client(&self) -> &DocumentClient {
        &self.inner.client
    }

    pub fn is_enabled(&self) -> bool {
        self.client().is_enabled()
    }

    /// Enable or disable the service.
    ///
    /// While disabled every operation fails with
    /// `DataError::ServiceDisabled` before touching the cache or network.
    pub fn set_enabled(&self, enabled: bool) {
        self.client().set_enabled(enabled);
    }

    /// Prepare local state for use, dropping cache entries that expired
    /// while the service was stopped.
    pub async fn start(&self) -> DataResult<()> {
        let purged = self.client().cache().purge_expired().await?;
        info!(
            purged,
            cache_backend = self.client().cache().backend_name(),
            "Data service started"
        );
        Ok(())
    }

    /// Tear down local state: cached documents and cached credentials.
    pub async fn stop(&self) -> DataResult<()> {
        let cleared = self.client().cache().clear().await?;
        self.client().tokens().clear();
        info!(cleared, "Data service stopped");
        Ok(())
    }

    /// Point token exchanges at a different service.
    pub fn set_token_exchange_url(&self, url: impl Into<String>) -> DataResult<()> {
        self.client().tokens().set_exchange_url(url)
    }

    /// Set or clear the signed-in user's access token.
    ///
    /// Documents cached for the previous user are dropped.
    pub async fn set_user_token(&self, token: Option<String>) -> DataResult<()> {
        self.client().tokens().set_user_token(token)?;
        self.client()
            .cache()
            .invalidate_partition(Partition::User)
            .await?;
        Ok(())
    }

    pub async fn cache_stats(&self) -> DataResult<CacheStats> {
        self.client().cache().stats().await
    }

    pub async fn read<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        options: Option<ReadOptions>,
    ) -> DocumentWrapper<T> {
        self.client().read(partition, document_id, options).await
    }

    pub async fn list<T: SerializableDocument>(&self, partition: Partition) -> PaginatedDocuments<T> {
        self.client().list(partition).await
    }

    pub async fn create<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        document: T,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        self.client()
            .create(partition, document_id, document, options)
            .await
    }

    pub async fn replace<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        document: T,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        self.client()
            .replace(partition, document_id, document, options)
            .await
    }

    pub async fn delete<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        options: WriteOptions,
    ) -> DocumentWrapper<T> {
        self.client().delete(partition, document_id, options).await
    }

    /// Spawn [`DataService::read`] and pass the result to `completion`.
    pub fn read_with_completion<T, F>(
        &self,
        partition: Partition,
        document_id: impl Into<String>,
        options: Option<ReadOptions>,
        completion: F,
    ) -> JoinHandle<()>
    where
        T: SerializableDocument,
        F: FnOnce(DocumentWrapper<T>) + Send + 'static,
    {
        let service = self.clone();
        let document_id = document_id.into();
        self.runtime.spawn(async move {
            completion(service.read(partition, &document_id, options).await);
        })
    }

    /// Spawn [`DataService::list`] and pass the paginator to `completion`.
    pub fn list_with_completion<T, F>(&self, partition: Partition, completion: F) -> JoinHandle<()>
    where
        T: SerializableDocument,
        F: FnOnce(PaginatedDocuments<T>) + Send + 'static,
    {
        let service = self.clone();
        self.runtime.spawn(async move {
            completion(service.list(partition).await);
        })
    }

    /// Spawn [`PaginatedDocuments::next_page`] and hand the paginator back.
    ///
    /// `completion` receives `Ok(())` when a new page became current, or the
    /// error of the page `next_page` returned (`NoMorePages`,
    /// `ServiceDisabled` or a failed fetch).
    pub fn next_page_with_completion<T, F>(
        &self,
        mut paginator: PaginatedDocuments<T>,
        completion: F,
    ) -> JoinHandle<()>
    where
        T: SerializableDocument,
        F: FnOnce(DataResult<()>, PaginatedDocuments<T>) + Send + 'static,
    {
        self.runtime.spawn(async move {
            let outcome = match paginator.next_page().await.error() {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
            completion(outcome, paginator);
        })
    }

    /// Spawn [`DataService::create`] and pass the result to `completion`.
    pub fn create_with_completion<T, F>(
        &self,
        partition: Partition,
        document_id: impl Into<String>,
        document: T,
        options: WriteOptions,
        completion: F,
    ) -> JoinHandle<()>
    where
        T: SerializableDocument,
        F: FnOnce(DocumentWrapper<T>) + Send + 'static,
    {
        let service = self.clone();
        let document_id = document_id.into();
        self.runtime.spawn(async move {
            completion(
                service
                    .create(partition, &document_id, document, options)
                    .await,
            );
        })
    }

    /// Spawn [`DataService::replace`] and pass the result to `completion`.
    pub fn replace_with_completion<T, F>(
        &self,
        partition: Partition,
        document_id: impl Into<String>,
        document: T,
        options: WriteOptions,
        completion: F,
    ) -> JoinHandle<()>
    where
        T: SerializableDocument,
        F: FnOnce(DocumentWrapper<T>) + Send + 'static,
    {
        let service = self.clone();
        let document_id = document_id.into();
        self.runtime.spawn(async move {
            completion(
                service
                    .replace(partition, &document_id, document, options)
                    .await,
            );
        })
    }

    /// Spawn [`DataService::delete`] and pass the result to `completion`.
    pub fn delete_with_completion<T, F>(
        &self,
        partition: Partition,
        document_id: impl Into<String>,
        options: WriteOptions,
        completion: F,
    ) -> JoinHandle<()>
    where
        T: SerializableDocument,
        F: FnOnce(DocumentWrapper<T>) + Send + 'static,
    {
        let service = self.clone();
        let document_id = document_id.into();
        self.runtime.spawn(async move {
            completion(service.delete(partition, &document_id, options).await);
        })
    }
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("config", &self.inner.config)
            .field("client", &self.inner.client)
            .finish()
    }
}
