//! Continuation-token pagination over a partition listing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use appdata_core::{DataError, DocumentWrapper, Page, Partition, SerializableDocument};
use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::remote::RemoteStore;

/// Where a paginator stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginatorState {
    /// The current page holds documents and more pages follow.
    HasData,
    /// No continuation token remains. Terminal.
    Exhausted,
    /// The current page is a failed fetch.
    Error,
}

/// A lazy, resumable cursor over a partition listing.
///
/// Holds one page at a time. Each successful [`next_page`] replaces the
/// page and the continuation token in place; a failed one replaces only the
/// page, so calling `next_page` again retries the same page.
///
/// The paginator shares the enabled flag of the client that created it;
/// once the service is disabled no further page is fetched.
///
/// [`next_page`]: PaginatedDocuments::next_page
pub struct PaginatedDocuments<T> {
    remote: Arc<RemoteStore>,
    enabled: Arc<AtomicBool>,
    partition: Partition,
    page: Page<T>,
    continuation: Option<String>,
    rejected: Page<T>,
}

impl<T: SerializableDocument> PaginatedDocuments<T> {
    /// Fetch the first page of `partition`.
    pub(crate) async fn first(
        remote: Arc<RemoteStore>,
        enabled: Arc<AtomicBool>,
        partition: Partition,
    ) -> Self {
        let (page, continuation) = match remote.list_page(partition, None).await {
            Ok(fetched) => fetched,
            Err(e) => (Page::failed(e), None),
        };
        Self::from_parts(remote, enabled, partition, page, continuation)
    }

    /// A paginator that failed before any page was fetched.
    pub(crate) fn failed(
        remote: Arc<RemoteStore>,
        enabled: Arc<AtomicBool>,
        partition: Partition,
        error: DataError,
    ) -> Self {
        Self::from_parts(remote, enabled, partition, Page::failed(error), None)
    }

    fn from_parts(
        remote: Arc<RemoteStore>,
        enabled: Arc<AtomicBool>,
        partition: Partition,
        page: Page<T>,
        continuation: Option<String>,
    ) -> Self {
        Self {
            remote,
            enabled,
            partition,
            page,
            continuation,
            rejected: Page::failed(DataError::NoMorePages),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn has_next_page(&self) -> bool {
        self.continuation.is_some()
    }

    pub fn current_page(&self) -> &Page<T> {
        &self.page
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn state(&self) -> PaginatorState {
        if self.page.is_error() {
            PaginatorState::Error
        } else if self.continuation.is_some() {
            PaginatorState::HasData
        } else {
            PaginatorState::Exhausted
        }
    }

    /// Fetch the next page.
    ///
    /// Without a continuation token this returns a page carrying
    /// [`DataError::NoMorePages`] and leaves the current page alone. While
    /// the service is disabled it returns a [`DataError::ServiceDisabled`]
    /// page the same way, keeping the token for later.
    pub async fn next_page(&mut self) -> &Page<T> {
        if !self.enabled.load(Ordering::SeqCst) {
            self.rejected = Page::failed(DataError::ServiceDisabled);
            return &self.rejected;
        }
        let Some(continuation) = self.continuation.as_deref() else {
            self.rejected = Page::failed(DataError::NoMorePages);
            return &self.rejected;
        };

        match self.remote.list_page(self.partition, Some(continuation)).await {
            Ok((page, next)) => {
                self.page = page;
                self.continuation = next;
            }
            Err(e) => {
                debug!(partition = %self.partition, error = %e, "page fetch failed, token kept");
                self.page = Page::failed(e);
            }
        }
        &self.page
    }

    /// Every remaining document, starting with the current page, as a stream.
    ///
    /// Pages are fetched only as the stream is polled. A failed page yields
    /// one failed wrapper and ends the stream, and so does disabling the
    /// service before the next fetch.
    pub fn into_stream(self) -> impl Stream<Item = DocumentWrapper<T>> {
        let pending_error = self.page.error().cloned();
        let state = StreamState {
            remote: self.remote,
            enabled: self.enabled,
            partition: self.partition,
            items: self.page.into_items().into_iter(),
            continuation: self.continuation,
            pending_error,
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.items.next() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }
                if let Some(error) = state.pending_error.take() {
                    state.done = true;
                    return Some((DocumentWrapper::failed(state.partition, "", error), state));
                }
                if state.continuation.is_some() && !state.enabled.load(Ordering::SeqCst) {
                    state.pending_error = Some(DataError::ServiceDisabled);
                    continue;
                }
                let continuation = state.continuation.take()?;
                match state
                    .remote
                    .list_page(state.partition, Some(&continuation))
                    .await
                {
                    Ok((page, next)) => {
                        state.items = page.into_items().into_iter();
                        state.continuation = next;
                    }
                    Err(e) => {
                        state.pending_error = Some(e);
                    }
                }
            }
        })
    }
}

struct StreamState<T> {
    remote: Arc<RemoteStore>,
    enabled: Arc<AtomicBool>,
    partition: Partition,
    items: std::vec::IntoIter<DocumentWrapper<T>>,
    continuation: Option<String>,
    pending_error: Option<DataError>,
    done: bool,
}

impl<T> std::fmt::Debug for PaginatedDocuments<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedDocuments")
            .field("partition", &self.partition)
            .field("items", &self.page.len())
            .field("page_error", &self.page.error())
            .field("has_next_page", &self.continuation.is_some())
            .finish()
    }
}
