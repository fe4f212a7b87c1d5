//! Token Resolver
//!
//! Exchanges the app secret (and the signed-in user's token, when there is
//! one) for short-lived per-partition database credentials, and caches them
//! until shortly before they expire.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use appdata_core::{Clock, DataError, DataResult, Partition, StorageError, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::transport::{HttpRequest, Method, Transport};

/// Status reported by the token exchange for a usable token.
pub const TOKEN_STATUS_SUCCEED: &str = "Succeed";

/// Header carrying the app secret on token exchange calls.
pub const APP_SECRET_HEADER: &str = "App-Secret";

/// Database credentials for one partition.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResult {
    /// Remote partition key, e.g. `user-<account id>` or `readonly`.
    pub partition: String,
    pub db_account: String,
    pub db_name: String,
    pub db_collection_name: String,
    pub token: String,
    pub status: String,
    #[serde(default)]
    pub expires_on: Option<Timestamp>,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl TokenResult {
    /// Whether the token should be refreshed at `now`.
    ///
    /// Tokens are treated as expired `skew` before their stated expiry.
    /// A token without an expiry stays valid until invalidated.
    pub fn needs_refresh(&self, now: Timestamp, skew: Duration) -> bool {
        let Some(expires_on) = self.expires_on else {
            return false;
        };
        let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::zero());
        now + skew >= expires_on
    }
}

impl std::fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResult")
            .field("partition", &self.partition)
            .field("db_account", &self.db_account)
            .field("db_name", &self.db_name)
            .field("db_collection_name", &self.db_collection_name)
            .field("token", &"[REDACTED]")
            .field("status", &self.status)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[derive(Serialize)]
struct TokenExchangeRequest<'a> {
    partitions: [&'a str; 1],
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    #[serde(default)]
    tokens: Vec<TokenResult>,
}

/// One in-progress exchange, shared by every caller that joins it.
type Flight = Arc<OnceCell<DataResult<TokenResult>>>;

/// Resolves and caches per-partition credentials.
///
/// Resolution is single-flight per partition: while one caller performs an
/// exchange, later callers for the same partition await that same exchange
/// and receive its outcome, success or failure. Partitions never share a
/// flight.
pub struct TokenResolver {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    app_secret: String,
    exchange_url: RwLock<String>,
    user_token: RwLock<Option<String>>,
    refresh_skew: Duration,
    tokens: DashMap<Partition, TokenResult>,
    flights: DashMap<Partition, Flight>,
}

impl TokenResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        app_secret: impl Into<String>,
        exchange_url: impl Into<String>,
        refresh_skew: Duration,
    ) -> Self {
        Self {
            transport,
            clock,
            app_secret: app_secret.into(),
            exchange_url: RwLock::new(exchange_url.into()),
            user_token: RwLock::new(None),
            refresh_skew,
            tokens: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// Point later exchanges at a different token exchange service.
    ///
    /// Cached tokens came from the old service and are dropped.
    pub fn set_exchange_url(&self, url: impl Into<String>) -> DataResult<()> {
        let mut guard = self
            .exchange_url
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *guard = url.into();
        drop(guard);
        self.clear();
        Ok(())
    }

    pub fn exchange_url(&self) -> DataResult<String> {
        Ok(self
            .exchange_url
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone())
    }

    /// Set or clear the signed-in user's access token.
    ///
    /// User-partition credentials are bound to the user, so they are dropped.
    pub fn set_user_token(&self, token: Option<String>) -> DataResult<()> {
        let mut guard = self
            .user_token
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *guard = token;
        drop(guard);
        self.invalidate(Partition::User);
        Ok(())
    }

    /// Get a valid credential for `partition`, exchanging if needed.
    pub async fn resolve(&self, partition: Partition) -> DataResult<TokenResult> {
        if let Some(token) = self.cached(partition) {
            return Ok(token);
        }

        let flight = self
            .flights
            .entry(partition)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = flight
            .get_or_init(|| async {
                // A flight that finished just before this one started may
                // already have filled the cache.
                if let Some(token) = self.cached(partition) {
                    return Ok(token);
                }
                let exchanged = self.exchange(partition).await;
                if let Ok(token) = &exchanged {
                    self.tokens.insert(partition, token.clone());
                }
                exchanged
            })
            .await
            .clone();

        // Finished flights are retired so the next miss exchanges again.
        self.flights
            .remove_if(&partition, |_, current| Arc::ptr_eq(current, &flight));
        outcome
    }

    /// Drop the cached credential for one partition.
    pub fn invalidate(&self, partition: Partition) {
        if self.tokens.remove(&partition).is_some() {
            debug!(partition = %partition, "invalidated cached token");
        }
    }

    /// Drop every cached credential.
    pub fn clear(&self) {
        self.tokens.clear();
        self.flights.clear();
    }

    fn cached(&self, partition: Partition) -> Option<TokenResult> {
        let token = self.tokens.get(&partition)?;
        if token.needs_refresh(self.clock.now(), self.refresh_skew) {
            return None;
        }
        Some(token.value().clone())
    }

    async fn exchange(&self, partition: Partition) -> DataResult<TokenResult> {
        let url = format!(
            "{}/data/tokens",
            self.exchange_url()?.trim_end_matches('/')
        );
        let user_token = self
            .user_token
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .clone();

        let mut request = HttpRequest::new(Method::Post, &url)
            .header(APP_SECRET_HEADER, &self.app_secret)
            .json(&TokenExchangeRequest {
                partitions: [partition.as_str()],
            })?;
        if let Some(user_token) = user_token {
            request = request.header("Authorization", format!("Bearer {}", user_token));
        }

        let auth_error = |status: Option<u16>, reason: String| DataError::Auth {
            partition: partition.to_string(),
            status,
            reason,
        };

        let response = self.transport.send(request).await.map_err(|e| {
            warn!(partition = %partition, error = %e, "Token exchange request failed");
            auth_error(None, e.to_string())
        })?;

        if !response.is_success() {
            warn!(
                partition = %partition,
                status = response.status,
                "Token exchange rejected"
            );
            return Err(auth_error(Some(response.status), response.text()));
        }

        let body: TokenExchangeResponse = response.json().map_err(|e| {
            auth_error(
                Some(response.status),
                format!("Malformed token exchange response: {}", e),
            )
        })?;

        let Some(token) = body.tokens.into_iter().next() else {
            return Err(auth_error(
                Some(response.status),
                "Token exchange returned no tokens".to_string(),
            ));
        };

        if token.status != TOKEN_STATUS_SUCCEED {
            return Err(auth_error(
                Some(response.status),
                format!("Token exchange returned status {}", token.status),
            ));
        }

        info!(
            partition = %partition,
            expires_on = ?token.expires_on,
            "Resolved partition token"
        );
        Ok(token)
    }
}

impl std::fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResolver")
            .field("exchange_url", &self.exchange_url)
            .field("app_secret", &"[REDACTED]")
            .field("refresh_skew", &self.refresh_skew)
            .field("cached_tokens", &self.tokens.len())
            .finish()
    }
}
