//! Remote document store operations.
//!
//! Resolves the partition credential, issues the CosmosDB request and
//! decodes the reply. No local caching happens at this layer; it is shared
//! between the document client and the paginators it hands out.

use std::sync::Arc;

use appdata_core::{
    Clock, DataError, DataResult, DocumentWrapper, Page, Partition, SerializableDocument,
    WriteOptions,
};
use tracing::{debug, warn};

use crate::cosmos::{self, DocumentEnvelope, ListEnvelope};
use crate::token::{TokenResolver, TokenResult};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Handle on the remote document store.
pub(crate) struct RemoteStore {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenResolver>,
    clock: Arc<dyn Clock>,
    api_version: String,
}

/// The kind of write sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Create,
    Upsert,
}

impl RemoteStore {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenResolver>,
        clock: Arc<dyn Clock>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            clock,
            api_version: api_version.into(),
        }
    }

    pub(crate) fn tokens(&self) -> &Arc<TokenResolver> {
        &self.tokens
    }

    pub(crate) async fn read<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
    ) -> DataResult<DocumentWrapper<T>> {
        let token = self.tokens.resolve(partition).await?;
        let request = self.request(
            Method::Get,
            cosmos::document_url(&token, Some(document_id)),
            &token,
        );

        let response = self.send(request, partition, document_id).await?;
        let envelope: DocumentEnvelope<T> = response.json()?;
        Ok(envelope.into_wrapper(partition))
    }

    pub(crate) async fn write<T: SerializableDocument>(
        &self,
        partition: Partition,
        document_id: &str,
        document: &T,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> DataResult<DocumentWrapper<T>> {
        let token = self.tokens.resolve(partition).await?;
        let envelope = DocumentEnvelope::new(document, token.partition.clone(), document_id);

        let mut request = self
            .request(Method::Post, cosmos::document_url(&token, None), &token)
            .json(&envelope)?;
        if mode == WriteMode::Upsert {
            request = request.header(cosmos::UPSERT_HEADER, "true");
        }
        if let Some(etag) = &options.if_match {
            request = request.header(cosmos::IF_MATCH_HEADER, etag);
        }

        let response = self.send(request, partition, document_id).await?;
        let stored: DocumentEnvelope<T> = response.json()?;
        Ok(stored.into_wrapper(partition))
    }

    pub(crate) async fn delete(
        &self,
        partition: Partition,
        document_id: &str,
        options: &WriteOptions,
    ) -> DataResult<()> {
        let token = self.tokens.resolve(partition).await?;
        let mut request = self.request(
            Method::Delete,
            cosmos::document_url(&token, Some(document_id)),
            &token,
        );
        if let Some(etag) = &options.if_match {
            request = request.header(cosmos::IF_MATCH_HEADER, etag);
        }

        self.send(request, partition, document_id).await?;
        Ok(())
    }

    /// Fetch one listing page and the token for the page after it.
    ///
    /// Documents that fail to decode become failed wrappers inside an
    /// otherwise successful page.
    pub(crate) async fn list_page<T: SerializableDocument>(
        &self,
        partition: Partition,
        continuation: Option<&str>,
    ) -> DataResult<(Page<T>, Option<String>)> {
        let token = self.tokens.resolve(partition).await?;
        let mut request = self.request(Method::Get, cosmos::document_url(&token, None), &token);
        if let Some(continuation) = continuation {
            request = request.header(cosmos::CONTINUATION_HEADER, continuation);
        }

        let response = self.send(request, partition, "").await?;
        let next = cosmos::continuation_token(&response);
        let listing: ListEnvelope = response.json()?;

        let items = listing
            .documents
            .into_iter()
            .map(|raw| decode_listed(raw, partition))
            .collect::<Vec<_>>();
        debug!(
            partition = %partition,
            count = items.len(),
            has_more = next.is_some(),
            "listed documents"
        );
        Ok((Page::new(items), next))
    }

    fn request(&self, method: Method, url: String, token: &TokenResult) -> HttpRequest {
        cosmos::request(method, url, token, &self.api_version, self.clock.now())
    }

    async fn send(
        &self,
        request: HttpRequest,
        partition: Partition,
        document_id: &str,
    ) -> DataResult<HttpResponse> {
        let method = request.method;
        let response = self.transport.send(request).await.map_err(|e| {
            warn!(partition = %partition, document_id, error = %e, "Document request failed");
            DataError::Transport(e)
        })?;

        if response.is_success() {
            return Ok(response);
        }

        warn!(
            partition = %partition,
            document_id,
            method = %method,
            status = response.status,
            "Document request rejected"
        );
        if matches!(response.status, 401 | 403) {
            // The credential was refused; the next call exchanges a new one.
            self.tokens.invalidate(partition);
        }
        Err(cosmos::status_error(&response, partition, document_id))
    }
}

fn decode_listed<T: SerializableDocument>(
    raw: serde_json::Value,
    partition: Partition,
) -> DocumentWrapper<T> {
    let document_id = raw
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    match serde_json::from_value::<DocumentEnvelope<T>>(raw) {
        Ok(envelope) => envelope.into_wrapper(partition),
        Err(e) => DocumentWrapper::failed(partition, document_id, DataError::serialization(e)),
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("tokens", &self.tokens)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}
