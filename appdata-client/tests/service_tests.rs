//! Service lifecycle, enable gating and completion adapters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appdata_client::{
    DataErrorKind, DataService, DocumentWrapper, Method, PaginatedDocuments, Partition,
    ReadOptions, WriteOptions,
};
use appdata_storage::LmdbCacheBackend;
use appdata_test_utils::assertions::{assert_error_kind, assert_present};
use appdata_test_utils::fixtures::{
    self, document_path, document_response, list_response, test_config, TestDocument, DOCS_PATH,
    TOKEN_EXCHANGE_PATH,
};
use appdata_test_utils::{ManualClock, MockTransport};
use futures_util::StreamExt;

fn serving(document_id: &str) -> Arc<MockTransport> {
    let transport = fixtures::transport_with_tokens();
    transport.on(
        Method::Get,
        &document_path(document_id),
        document_response(
            200,
            Partition::User,
            document_id,
            &TestDocument::new(document_id, 7),
            "\"etag-1\"",
        ),
    );
    transport
}

fn disabled_service(transport: Arc<MockTransport>) -> DataService {
    fixtures::service_with_config(
        test_config().with_enabled(false),
        transport,
        ManualClock::at_epoch(),
    )
}

#[tokio::test]
async fn test_disabled_service_rejects_everything_without_io() {
    let transport = serving("doc1");
    let service = disabled_service(transport.clone());
    assert!(!service.is_enabled());

    let read = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    assert_error_kind(&read, DataErrorKind::ServiceDisabled);

    let created = service
        .create(
            Partition::User,
            "doc2",
            TestDocument::new("two", 2),
            WriteOptions::default(),
        )
        .await;
    assert_error_kind(&created, DataErrorKind::ServiceDisabled);

    let replaced = service
        .replace(
            Partition::User,
            "doc2",
            TestDocument::new("two", 2),
            WriteOptions::default(),
        )
        .await;
    assert_error_kind(&replaced, DataErrorKind::ServiceDisabled);

    let deleted = service
        .delete::<TestDocument>(Partition::User, "doc2", WriteOptions::default())
        .await;
    assert_error_kind(&deleted, DataErrorKind::ServiceDisabled);

    let mut listing = service.list::<TestDocument>(Partition::ReadOnly).await;
    assert_eq!(
        listing.current_page().error().map(|e| e.kind()),
        Some(DataErrorKind::ServiceDisabled)
    );
    assert!(!listing.has_next_page());
    assert_eq!(
        listing.next_page().await.error().map(|e| e.kind()),
        Some(DataErrorKind::NoMorePages)
    );

    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_reenabled_service_serves_requests() {
    let transport = serving("doc1");
    let service = disabled_service(transport.clone());

    service.set_enabled(true);
    assert!(service.is_enabled());

    let read = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    assert_present(&read);
    assert_eq!(read.value().map(|doc| doc.count), Some(7));

    service.set_enabled(false);
    let cached = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    assert_error_kind(&cached, DataErrorKind::ServiceDisabled);
}

#[tokio::test]
async fn test_disabling_one_clone_disables_all() {
    let service = fixtures::service(serving("doc1"), ManualClock::at_epoch());
    let other = service.clone();

    other.set_enabled(false);
    assert!(!service.is_enabled());
}

fn two_page_listing() -> Arc<MockTransport> {
    let listed = |id: &str| {
        fixtures::document_json(Partition::User, id, &TestDocument::new(id, 1), "\"e\"")
    };
    let transport = fixtures::transport_with_tokens();
    transport
        .on(
            Method::Get,
            DOCS_PATH,
            list_response(vec![listed("a"), listed("b")], Some("c1")),
        )
        .on(Method::Get, DOCS_PATH, list_response(vec![listed("c")], None));
    transport
}

#[tokio::test]
async fn test_disabling_mid_listing_stops_paging() {
    let transport = two_page_listing();
    let service = fixtures::service(transport.clone(), ManualClock::at_epoch());

    let mut docs = service.list::<TestDocument>(Partition::User).await;
    assert_eq!(docs.current_page().len(), 2);
    let calls_before = transport.calls();

    service.set_enabled(false);
    let rejected = docs.next_page().await;
    assert_eq!(
        rejected.error().map(|e| e.kind()),
        Some(DataErrorKind::ServiceDisabled)
    );
    assert_eq!(transport.calls(), calls_before);
    assert_eq!(docs.current_page().len(), 2);
    assert_eq!(docs.continuation_token(), Some("c1"));

    service.set_enabled(true);
    assert_eq!(docs.next_page().await.len(), 1);
    assert!(!docs.has_next_page());
}

#[tokio::test]
async fn test_disabling_stops_stream_before_next_fetch() {
    let transport = two_page_listing();
    let service = fixtures::service(transport.clone(), ManualClock::at_epoch());

    let docs = service.list::<TestDocument>(Partition::User).await;
    let calls_before = transport.calls();
    service.set_enabled(false);

    let all: Vec<_> = docs.into_stream().collect().await;
    assert_eq!(all.len(), 3);
    assert!(all[0].is_success() && all[1].is_success());
    assert_error_kind(&all[2], DataErrorKind::ServiceDisabled);
    assert_eq!(transport.calls(), calls_before);
}

#[tokio::test]
async fn test_client_handle_honours_disabled_flag() {
    let transport = serving("doc1");
    let service = disabled_service(transport.clone());
    let client = service.client();
    assert!(!client.is_enabled());

    let read = client
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    assert_error_kind(&read, DataErrorKind::ServiceDisabled);

    let created = client
        .create(
            Partition::User,
            "doc2",
            TestDocument::new("two", 2),
            WriteOptions::default(),
        )
        .await;
    assert_error_kind(&created, DataErrorKind::ServiceDisabled);

    let deleted = client
        .delete::<TestDocument>(Partition::User, "doc1", WriteOptions::default())
        .await;
    assert_error_kind(&deleted, DataErrorKind::ServiceDisabled);

    let listing = client.list::<TestDocument>(Partition::User).await;
    assert_eq!(
        listing.current_page().error().map(|e| e.kind()),
        Some(DataErrorKind::ServiceDisabled)
    );

    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_next_page_completion_hands_paginator_back() {
    let transport = two_page_listing();
    let service = fixtures::service(transport, ManualClock::at_epoch());
    let invocations = Arc::new(AtomicUsize::new(0));
    let returned = Arc::new(Mutex::new(None));

    let docs = service.list::<TestDocument>(Partition::User).await;
    let handle = {
        let invocations = Arc::clone(&invocations);
        let returned = Arc::clone(&returned);
        service.next_page_with_completion(docs, move |outcome, docs| {
            assert!(outcome.is_ok());
            invocations.fetch_add(1, Ordering::SeqCst);
            *returned.lock().unwrap() = Some(docs);
        })
    };
    handle.await.unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let docs = returned.lock().unwrap().take().unwrap();
    assert_eq!(docs.current_page().len(), 1);
    assert!(!docs.has_next_page());

    let handle = {
        let invocations = Arc::clone(&invocations);
        service.next_page_with_completion(docs, move |outcome, docs| {
            assert_eq!(outcome.unwrap_err().kind(), DataErrorKind::NoMorePages);
            assert_eq!(docs.current_page().len(), 1);
            invocations.fetch_add(1, Ordering::SeqCst);
        })
    };
    handle.await.unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_read_completion_runs_exactly_once() {
    let transport = serving("doc1");
    let service = fixtures::service(transport, ManualClock::at_epoch());
    let invocations = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(None));

    let handle = {
        let invocations = Arc::clone(&invocations);
        let received = Arc::clone(&received);
        service.read_with_completion(
            Partition::User,
            "doc1",
            None,
            move |doc: DocumentWrapper<TestDocument>| {
                invocations.fetch_add(1, Ordering::SeqCst);
                *received.lock().unwrap() = doc.into_value();
            },
        )
    };
    handle.await.unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(
        received.lock().unwrap().clone(),
        Some(TestDocument::new("doc1", 7))
    );
}

#[tokio::test]
async fn test_failed_operations_still_complete_once() {
    let transport = fixtures::transport_with_tokens();
    let service = fixtures::service(transport.clone(), ManualClock::at_epoch());
    let invocations = Arc::new(AtomicUsize::new(0));

    let create = {
        let invocations = Arc::clone(&invocations);
        service.create_with_completion(
            Partition::ReadOnly,
            "doc1",
            TestDocument::new("blocked", 1),
            WriteOptions::default(),
            move |doc| {
                assert_error_kind(&doc, DataErrorKind::Permission);
                invocations.fetch_add(1, Ordering::SeqCst);
            },
        )
    };
    let replace = {
        let invocations = Arc::clone(&invocations);
        service.replace_with_completion(
            Partition::ReadOnly,
            "doc1",
            TestDocument::new("blocked", 1),
            WriteOptions::default(),
            move |doc| {
                assert_error_kind(&doc, DataErrorKind::Permission);
                invocations.fetch_add(1, Ordering::SeqCst);
            },
        )
    };
    let delete = {
        let invocations = Arc::clone(&invocations);
        service.delete_with_completion(
            Partition::ReadOnly,
            "doc1",
            WriteOptions::default(),
            move |doc: DocumentWrapper<TestDocument>| {
                assert_error_kind(&doc, DataErrorKind::Permission);
                invocations.fetch_add(1, Ordering::SeqCst);
            },
        )
    };

    create.await.unwrap();
    replace.await.unwrap();
    delete.await.unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_list_completion_receives_first_page() {
    let transport = fixtures::transport_with_tokens();
    transport.on(
        Method::Get,
        DOCS_PATH,
        list_response(
            vec![fixtures::document_json(
                Partition::ReadOnly,
                "config",
                &TestDocument::new("config", 3),
                "\"e\"",
            )],
            Some("next"),
        ),
    );
    let service = fixtures::service(transport, ManualClock::at_epoch());
    let invocations = Arc::new(AtomicUsize::new(0));

    let handle = {
        let invocations = Arc::clone(&invocations);
        service.list_with_completion(
            Partition::ReadOnly,
            move |docs: PaginatedDocuments<TestDocument>| {
                invocations.fetch_add(1, Ordering::SeqCst);
                assert_eq!(docs.current_page().len(), 1);
                assert!(docs.has_next_page());
            },
        )
    };
    handle.await.unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_completion_on_disabled_service() {
    let transport = fixtures::transport_with_tokens();
    let service = disabled_service(transport.clone());
    let invocations = Arc::new(AtomicUsize::new(0));

    let handle = {
        let invocations = Arc::clone(&invocations);
        service.read_with_completion(
            Partition::User,
            "doc1",
            None,
            move |doc: DocumentWrapper<TestDocument>| {
                assert_error_kind(&doc, DataErrorKind::ServiceDisabled);
                invocations.fetch_add(1, Ordering::SeqCst);
            },
        )
    };
    handle.await.unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_start_purges_entries_that_expired_while_stopped() {
    let clock = ManualClock::at_epoch();
    let service = fixtures::service(serving("doc1"), clock.clone());

    service
        .read::<TestDocument>(
            Partition::User,
            "doc1",
            Some(ReadOptions::with_time_to_live(60).unwrap()),
        )
        .await;
    assert_eq!(service.cache_stats().await.unwrap().entry_count, 1);

    clock.advance(Duration::from_secs(120));
    service.start().await.unwrap();

    let stats = service.cache_stats().await.unwrap();
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.expirations, 1);
}

#[tokio::test]
async fn test_stop_clears_documents_and_tokens() {
    let transport = serving("doc1");
    let service = fixtures::service(transport.clone(), ManualClock::at_epoch());

    service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    service.stop().await.unwrap();
    assert_eq!(service.cache_stats().await.unwrap().entry_count, 0);

    let again = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    assert!(!again.from_cache());
    assert_eq!(transport.calls_to(Method::Post, TOKEN_EXCHANGE_PATH), 2);
    assert_eq!(transport.calls_to(Method::Get, &document_path("doc1")), 2);
}

#[tokio::test]
async fn test_user_token_change_drops_user_documents() {
    let transport = serving("doc1");
    let service = fixtures::service(transport.clone(), ManualClock::at_epoch());

    service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    service
        .set_user_token(Some("new-user".to_string()))
        .await
        .unwrap();

    let again = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    assert!(!again.from_cache());
    let exchange = transport
        .last_request_to(Method::Post, TOKEN_EXCHANGE_PATH)
        .unwrap();
    assert_eq!(exchange.header_value("Authorization"), Some("Bearer new-user"));
}

#[tokio::test]
async fn test_token_exchange_url_override() {
    let transport = serving("doc1");
    let service = fixtures::service(transport.clone(), ManualClock::at_epoch());

    service
        .set_token_exchange_url("https://override.test/v1")
        .unwrap();
    service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;

    let exchange = transport
        .last_request_to(Method::Post, TOKEN_EXCHANGE_PATH)
        .unwrap();
    assert_eq!(exchange.url, "https://override.test/v1/data/tokens");
}

#[tokio::test]
async fn test_lmdb_backed_service_caches_reads() {
    let dir = tempfile::tempdir().unwrap();
    let backend = LmdbCacheBackend::new(dir.path(), 16).unwrap();
    let transport = serving("doc1");
    let service = DataService::builder(test_config())
        .with_transport(transport.clone())
        .with_clock(ManualClock::at_epoch())
        .with_cache_backend(Arc::new(backend))
        .build()
        .unwrap();

    let first = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;
    let second = service
        .read::<TestDocument>(Partition::User, "doc1", None)
        .await;

    assert!(!first.from_cache());
    assert!(second.from_cache());
    assert_eq!(second.etag(), Some("\"etag-1\""));
    assert_eq!(transport.calls_to(Method::Get, &document_path("doc1")), 1);
}

#[test]
fn test_build_outside_runtime_fails() {
    let result = DataService::builder(test_config())
        .with_transport(Arc::new(MockTransport::new()))
        .build();

    assert_eq!(result.unwrap_err().kind(), DataErrorKind::Config);
}

#[test]
fn test_build_with_explicit_runtime_handle() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let transport = serving("doc1");
    let service = DataService::builder(test_config())
        .with_transport(transport)
        .with_clock(ManualClock::at_epoch())
        .with_runtime(runtime.handle().clone())
        .build()
        .unwrap();

    let invocations = Arc::new(AtomicUsize::new(0));
    let handle = {
        let invocations = Arc::clone(&invocations);
        service.read_with_completion(
            Partition::User,
            "doc1",
            None,
            move |doc: DocumentWrapper<TestDocument>| {
                assert_present(&doc);
                invocations.fetch_add(1, Ordering::SeqCst);
            },
        )
    };
    runtime.block_on(handle).unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = DataService::builder(test_config().with_token_exchange_url(""))
        .with_transport(Arc::new(MockTransport::new()))
        .build();

    assert_eq!(result.unwrap_err().kind(), DataErrorKind::Config);
}
