//! AppData Test Utilities
//!
//! Centralized test infrastructure for the AppData workspace:
//! - A scripted mock transport with per-route call counters
//! - A manually driven clock for TTL and token-expiry tests
//! - Proptest generators for partitions, TTLs and document ids
//! - Wire fixtures for token exchange and document responses
//! - Custom assertions on document wrappers

// Re-export core types for convenience
pub use appdata_client::{
    DataService, HttpRequest, HttpResponse, Method, PaginatedDocuments, Transport,
};
pub use appdata_core::{
    Clock, DataConfig, DataError, DataErrorKind, DocumentWrapper, Partition, TimeToLive,
    Timestamp, TransportError,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(HttpResponse),
    Fail(TransportError),
}

#[derive(Debug)]
struct Route {
    method: Method,
    url_fragment: String,
    replies: VecDeque<MockReply>,
}

/// Transport that answers from a script and records every request.
///
/// Requests are matched against routes by method and URL substring; when
/// several routes match, the longest fragment wins. Each route replays its
/// replies in order and keeps repeating the last one.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every reply for `delay` so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response for requests matching `method` and `url_fragment`.
    pub fn on(&self, method: Method, url_fragment: &str, response: HttpResponse) -> &Self {
        self.push(method, url_fragment, MockReply::Respond(response))
    }

    /// Queue a transport failure for matching requests.
    pub fn fail(&self, method: Method, url_fragment: &str, error: TransportError) -> &Self {
        self.push(method, url_fragment, MockReply::Fail(error))
    }

    /// Drop whatever is queued for the route and answer with `response` from now on.
    pub fn replace(&self, method: Method, url_fragment: &str, response: HttpResponse) -> &Self {
        lock(&self.routes)
            .retain(|route| !(route.method == method && route.url_fragment == url_fragment));
        self.on(method, url_fragment, response)
    }

    fn push(&self, method: Method, url_fragment: &str, reply: MockReply) -> &Self {
        let mut routes = lock(&self.routes);
        match routes
            .iter_mut()
            .find(|route| route.method == method && route.url_fragment == url_fragment)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                url_fragment: url_fragment.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Total number of requests sent.
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Number of requests matching `method` whose URL contains `url_fragment`.
    pub fn calls_to(&self, method: Method, url_fragment: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|request| request.method == method && request.url.contains(url_fragment))
            .count()
    }

    /// The most recent request matching `method` and `url_fragment`.
    pub fn last_request_to(&self, method: Method, url_fragment: &str) -> Option<HttpRequest> {
        lock(&self.requests)
            .iter()
            .rev()
            .find(|request| request.method == method && request.url.contains(url_fragment))
            .cloned()
    }

    fn reply_for(&self, request: &HttpRequest) -> MockReply {
        let mut routes = lock(&self.routes);
        let route = routes
            .iter_mut()
            .filter(|route| route.method == request.method && request.url.contains(&route.url_fragment))
            .max_by_key(|route| route.url_fragment.len());

        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| unmatched(request)),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| unmatched(request)),
            None => unmatched(request),
        }
    }
}

fn unmatched(request: &HttpRequest) -> MockReply {
    MockReply::Fail(TransportError::RequestFailed {
        url: request.url.clone(),
        reason: format!("no mock route for {} {}", request.method, request.url),
    })
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request.clone());
        let reply = self.reply_for(&request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            MockReply::Respond(response) => Ok(response),
            MockReply::Fail(error) => Err(error),
        }
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// A clock at [`fixtures::epoch`].
    pub fn at_epoch() -> Arc<Self> {
        Arc::new(Self::new(fixtures::epoch()))
    }

    pub fn set(&self, now: Timestamp) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = lock(&self.now);
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *lock(&self.now)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for AppData types.

    use super::*;
    use proptest::prelude::*;

    /// Generate either partition.
    pub fn arb_partition() -> impl Strategy<Value = Partition> {
        prop_oneof![Just(Partition::User), Just(Partition::ReadOnly)]
    }

    /// Generate any TTL policy.
    pub fn arb_time_to_live() -> impl Strategy<Value = TimeToLive> {
        prop_oneof![
            Just(TimeToLive::Infinite),
            Just(TimeToLive::NoCache),
            (1u64..10_000_000).prop_map(TimeToLive::Seconds),
        ]
    }

    /// Generate a finite, cacheable TTL.
    pub fn arb_finite_time_to_live() -> impl Strategy<Value = TimeToLive> {
        (2u64..10_000_000).prop_map(TimeToLive::Seconds)
    }

    /// Generate a non-empty document id.
    pub fn arb_document_id() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{1,36}"
    }

    /// Generate a Timestamp (2020-2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(fixtures::epoch)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Wire fixtures and ready-made services.

    use super::*;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    pub const TOKEN_EXCHANGE_URL: &str = "https://token.test/v0.1";
    pub const TOKEN_EXCHANGE_PATH: &str = "/data/tokens";
    pub const DB_ACCOUNT: &str = "test-account";
    pub const DB_NAME: &str = "test-db";
    pub const DB_COLLECTION: &str = "test-coll";
    pub const ACCOUNT_ID: &str = "account-1";
    pub const APP_SECRET: &str = "test-app-secret";

    /// Path fragment of the collection, matching list and write requests.
    pub const DOCS_PATH: &str = "/docs";

    /// A simple document payload.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TestDocument {
        pub name: String,
        pub count: u32,
    }

    impl TestDocument {
        pub fn new(name: impl Into<String>, count: u32) -> Self {
            Self {
                name: name.into(),
                count,
            }
        }
    }

    /// Fixed reference instant used as T0 in tests.
    pub fn epoch() -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Configuration pointing at the mock token exchange.
    pub fn test_config() -> DataConfig {
        DataConfig::new(APP_SECRET).with_token_exchange_url(TOKEN_EXCHANGE_URL)
    }

    /// The remote partition key the token exchange hands out.
    pub fn remote_partition_key(partition: Partition) -> String {
        match partition {
            Partition::User => format!("user-{}", ACCOUNT_ID),
            Partition::ReadOnly => "readonly".to_string(),
        }
    }

    /// A successful token exchange response for `partition`.
    pub fn token_response(partition: Partition, expires_on: Timestamp) -> HttpResponse {
        token_response_with_status(partition, expires_on, "Succeed")
    }

    /// A token exchange response whose token carries `status`.
    pub fn token_response_with_status(
        partition: Partition,
        expires_on: Timestamp,
        status: &str,
    ) -> HttpResponse {
        let body = json!({
            "tokens": [{
                "partition": remote_partition_key(partition),
                "dbAccount": DB_ACCOUNT,
                "dbName": DB_NAME,
                "dbCollectionName": DB_COLLECTION,
                "token": format!("token-for-{}", partition),
                "status": status,
                "expiresOn": expires_on.to_rfc3339(),
                "accountId": ACCOUNT_ID,
            }]
        });
        HttpResponse::new(200, body.to_string())
    }

    /// Path fragment of one document URL.
    pub fn document_path(document_id: &str) -> String {
        format!("{}/{}", DOCS_PATH, document_id)
    }

    /// Stored-document JSON as the store returns it.
    pub fn document_json<T: Serialize>(
        partition: Partition,
        document_id: &str,
        document: &T,
        etag: &str,
    ) -> serde_json::Value {
        json!({
            "document": document,
            "PartitionKey": remote_partition_key(partition),
            "id": document_id,
            "_etag": etag,
            "_ts": epoch().timestamp(),
        })
    }

    /// A 200/201 response carrying one stored document.
    pub fn document_response<T: Serialize>(
        status: u16,
        partition: Partition,
        document_id: &str,
        document: &T,
        etag: &str,
    ) -> HttpResponse {
        HttpResponse::new(
            status,
            document_json(partition, document_id, document, etag).to_string(),
        )
        .with_header("etag", etag)
    }

    /// One listing page, with a continuation header when `continuation` is set.
    pub fn list_response(documents: Vec<serde_json::Value>, continuation: Option<&str>) -> HttpResponse {
        let count = documents.len();
        let response = HttpResponse::new(
            200,
            json!({ "Documents": documents, "_count": count }).to_string(),
        );
        match continuation {
            Some(token) => response.with_header("x-ms-continuation", token),
            None => response,
        }
    }

    /// An error response from the store.
    pub fn error_response(status: u16) -> HttpResponse {
        HttpResponse::new(status, json!({ "code": status, "message": "error" }).to_string())
    }

    /// A mock transport that hands out tokens for both partitions valid
    /// for a day past [`epoch`].
    pub fn transport_with_tokens() -> Arc<MockTransport> {
        let transport = Arc::new(MockTransport::new());
        register_tokens(&transport);
        transport
    }

    /// Route every token exchange on `transport`, whatever the partition,
    /// to a day-long user-partition token.
    pub fn register_tokens(transport: &MockTransport) {
        transport.on(
            Method::Post,
            TOKEN_EXCHANGE_PATH,
            token_response(Partition::User, epoch() + chrono::Duration::days(1)),
        );
    }

    /// A service wired to `transport` and `clock` on the current runtime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn service(transport: Arc<MockTransport>, clock: Arc<ManualClock>) -> DataService {
        service_with_config(test_config(), transport, clock)
    }

    pub fn service_with_config(
        config: DataConfig,
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    ) -> DataService {
        match DataService::builder(config)
            .with_transport(transport)
            .with_clock(clock)
            .build()
        {
            Ok(service) => service,
            Err(e) => panic!("test service should build: {}", e),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on document wrappers.

    use super::*;

    /// Assert that a wrapper holds a payload.
    #[track_caller]
    pub fn assert_present<T: std::fmt::Debug>(wrapper: &DocumentWrapper<T>) {
        assert!(
            wrapper.value().is_some(),
            "Expected a document, got: {:?}",
            wrapper
        );
    }

    /// Assert that a wrapper failed with an error of `kind`.
    #[track_caller]
    pub fn assert_error_kind<T: std::fmt::Debug>(wrapper: &DocumentWrapper<T>, kind: DataErrorKind) {
        match wrapper.error() {
            Some(error) => assert_eq!(error.kind(), kind, "Wrong error kind: {:?}", error),
            None => panic!("Expected {:?} error, got: {:?}", kind, wrapper),
        }
    }
}

// ============================================================================
// LOGGING
// ============================================================================

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; repeated calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TESTS
// ============================================================================
