//! CosmosDB REST wire layer.
//!
//! URL layout, request headers, document envelopes and status mapping for
//! the partitioned document store behind the token exchange.

use appdata_core::{DataError, DocumentWrapper, Partition, Timestamp};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::token::TokenResult;
use crate::transport::{HttpRequest, HttpResponse, Method};

pub const API_VERSION_HEADER: &str = "x-ms-version";
pub const DATE_HEADER: &str = "x-ms-date";
pub const PARTITION_KEY_HEADER: &str = "x-ms-documentdb-partitionkey";
pub const UPSERT_HEADER: &str = "x-ms-documentdb-is-upsert";
pub const CONTINUATION_HEADER: &str = "x-ms-continuation";
pub const IF_MATCH_HEADER: &str = "If-Match";

const COSMOS_HOST_SUFFIX: &str = "documents.azure.com";

/// Collection URL, or the URL of one document when `document_id` is set.
pub fn document_url(token: &TokenResult, document_id: Option<&str>) -> String {
    let mut url = format!(
        "https://{}.{}/dbs/{}/colls/{}/docs",
        token.db_account, COSMOS_HOST_SUFFIX, token.db_name, token.db_collection_name
    );
    if let Some(id) = document_id {
        url.push('/');
        url.push_str(&urlencoding::encode(id));
    }
    url
}

/// RFC 1123 date as CosmosDB expects in `x-ms-date`.
pub fn http_date(now: Timestamp) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// A request to the document store carrying the standard headers.
pub fn request(
    method: Method,
    url: impl Into<String>,
    token: &TokenResult,
    api_version: &str,
    now: Timestamp,
) -> HttpRequest {
    HttpRequest::new(method, url)
        .header("Authorization", urlencoding::encode(&token.token).into_owned())
        .header(API_VERSION_HEADER, api_version)
        .header(DATE_HEADER, http_date(now))
        .header(PARTITION_KEY_HEADER, format!("[\"{}\"]", token.partition))
}

/// A document as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEnvelope<T> {
    pub document: T,
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    pub id: String,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification, seconds since the Unix epoch.
    #[serde(rename = "_ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl<T> DocumentEnvelope<T> {
    /// An outgoing envelope; the server assigns ETag and timestamp.
    pub fn new(document: T, partition_key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            document,
            partition_key: partition_key.into(),
            id: id.into(),
            etag: None,
            timestamp: None,
        }
    }

    pub fn last_updated(&self) -> Option<Timestamp> {
        self.timestamp
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
    }

    /// Wrap the payload under the caller's logical partition.
    pub fn into_wrapper(self, partition: Partition) -> DocumentWrapper<T> {
        let last_updated = self.last_updated();
        DocumentWrapper::new(partition, self.id, self.document, self.etag, last_updated)
    }
}

/// One page of a collection listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope {
    /// Documents kept as JSON so one bad document fails alone.
    #[serde(rename = "Documents", default)]
    pub documents: Vec<serde_json::Value>,
}

/// Continuation token for the next page, if the server sent one.
pub fn continuation_token(response: &HttpResponse) -> Option<String> {
    response
        .header(CONTINUATION_HEADER)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Map a non-success response to the error the caller sees.
pub fn status_error(response: &HttpResponse, partition: Partition, document_id: &str) -> DataError {
    let message = response.text();
    match response.status {
        404 => DataError::NotFound {
            partition: partition.to_string(),
            document_id: document_id.to_string(),
        },
        409 | 412 => DataError::Conflict {
            partition: partition.to_string(),
            document_id: document_id.to_string(),
            status: response.status,
            message,
        },
        401 | 403 => DataError::Auth {
            partition: partition.to_string(),
            status: Some(response.status),
            reason: message,
        },
        status => DataError::Http { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appdata_core::DataErrorKind;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn token() -> TokenResult {
        TokenResult {
            partition: "user-42".to_string(),
            db_account: "acct".to_string(),
            db_name: "db".to_string(),
            db_collection_name: "coll".to_string(),
            token: "type=resource&sig=a b".to_string(),
            status: "Succeed".to_string(),
            expires_on: None,
            account_id: Some("42".to_string()),
        }
    }

    #[test]
    fn test_document_url() {
        assert_eq!(
            document_url(&token(), None),
            "https://acct.documents.azure.com/dbs/db/colls/coll/docs"
        );
        assert_eq!(
            document_url(&token(), Some("a b")),
            "https://acct.documents.azure.com/dbs/db/colls/coll/docs/a%20b"
        );
    }

    #[test]
    fn test_standard_headers() {
        let now = Utc.with_ymd_and_hms(2019, 6, 5, 18, 17, 25).unwrap();
        let req = request(Method::Get, "https://x", &token(), "2018-06-18", now);

        assert_eq!(
            req.header_value("authorization"),
            Some("type%3Dresource%26sig%3Da%20b")
        );
        assert_eq!(req.header_value(API_VERSION_HEADER), Some("2018-06-18"));
        assert_eq!(req.header_value(DATE_HEADER), Some("Wed, 05 Jun 2019 18:17:25 GMT"));
        assert_eq!(req.header_value(PARTITION_KEY_HEADER), Some("[\"user-42\"]"));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let outgoing = DocumentEnvelope::new(json!({"n": 1}), "user-42", "doc1");
        assert_eq!(
            serde_json::to_value(&outgoing).unwrap(),
            json!({"document": {"n": 1}, "PartitionKey": "user-42", "id": "doc1"})
        );

        let incoming: DocumentEnvelope<serde_json::Value> = serde_json::from_value(json!({
            "document": {"n": 2},
            "PartitionKey": "user-42",
            "id": "doc1",
            "_etag": "\"0001\"",
            "_ts": 1_559_758_645
        }))
        .unwrap();
        let wrapper = incoming.into_wrapper(Partition::User);
        assert_eq!(wrapper.partition(), Partition::User);
        assert_eq!(wrapper.etag(), Some("\"0001\""));
        assert_eq!(
            wrapper.last_updated(),
            Some(Utc.with_ymd_and_hms(2019, 6, 5, 18, 17, 25).unwrap())
        );
    }

    #[test]
    fn test_status_mapping() {
        let kind = |status: u16| {
            status_error(&HttpResponse::new(status, "body"), Partition::User, "d").kind()
        };
        assert_eq!(kind(404), DataErrorKind::NotFound);
        assert_eq!(kind(409), DataErrorKind::Conflict);
        assert_eq!(kind(412), DataErrorKind::Conflict);
        assert_eq!(kind(401), DataErrorKind::Auth);
        assert_eq!(kind(403), DataErrorKind::Auth);
        assert_eq!(kind(500), DataErrorKind::Http);
        assert_eq!(kind(429), DataErrorKind::Http);
    }

    #[test]
    fn test_continuation_token() {
        let with = HttpResponse::new(200, "{}").with_header("x-ms-continuation", "abc");
        assert_eq!(continuation_token(&with).as_deref(), Some("abc"));
        let empty = HttpResponse::new(200, "{}").with_header("x-ms-continuation", "");
        assert_eq!(continuation_token(&empty), None);
        assert_eq!(continuation_token(&HttpResponse::new(200, "{}")), None);
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_document_url_keeps_id_in_one_segment(id in "[ -~]{1,40}") {
                let url = document_url(&token(), Some(&id));
                let (base, tail) = url.rsplit_once('/').unwrap();
                prop_assert_eq!(base, "https://acct.documents.azure.com/dbs/db/colls/coll/docs");
                prop_assert_eq!(urlencoding::decode(tail).unwrap(), id);
            }

            #[test]
            fn prop_server_errors_are_http(status in 500u16..600) {
                let error = status_error(&HttpResponse::new(status, ""), Partition::ReadOnly, "d");
                prop_assert_eq!(error.kind(), DataErrorKind::Http);
                prop_assert!(error.is_retryable());
            }
        }
    }
}
