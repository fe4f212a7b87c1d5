//! Service configuration
//!
//! Replaces process-wide statics (enable flag, token exchange URL override)
//! with one explicit value handed to the service at construction.

use crate::{ConfigError, DataError, DataResult, TimeToLive};
use std::time::Duration;

/// Default token exchange service base URL.
pub const DEFAULT_TOKEN_EXCHANGE_URL: &str = "https://tokenexchange.appcenter.ms/v0.1";

/// CosmosDB REST API version sent with every document request.
pub const DEFAULT_COSMOS_API_VERSION: &str = "2018-06-18";

/// Configuration for the data service.
#[derive(Clone, PartialEq, Eq)]
pub struct DataConfig {
    /// Application secret sent to the token exchange service.
    pub app_secret: String,
    /// Base URL of the token exchange service.
    pub token_exchange_url: String,
    /// Whether the service starts enabled.
    pub enabled: bool,
    /// TTL applied to reads without options and to every successful write.
    pub default_time_to_live: TimeToLive,
    /// Tokens are refreshed this long before their stated expiry.
    pub token_refresh_skew: Duration,
    /// CosmosDB `x-ms-version` header value.
    pub cosmos_api_version: String,
    /// Timeout for each HTTP request issued by the default transport.
    pub request_timeout: Duration,
    /// Optional upper bound on locally cached documents.
    pub max_cache_entries: Option<usize>,
}

impl DataConfig {
    /// Create a configuration with defaults for everything but the secret.
    pub fn new(app_secret: impl Into<String>) -> Self {
        Self {
            app_secret: app_secret.into(),
            token_exchange_url: DEFAULT_TOKEN_EXCHANGE_URL.to_string(),
            enabled: true,
            default_time_to_live: TimeToLive::default(),
            token_refresh_skew: Duration::from_secs(60),
            cosmos_api_version: DEFAULT_COSMOS_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
            max_cache_entries: None,
        }
    }

    pub fn with_token_exchange_url(mut self, url: impl Into<String>) -> Self {
        self.token_exchange_url = url.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_default_time_to_live(mut self, ttl: TimeToLive) -> Self {
        self.default_time_to_live = ttl;
        self
    }

    pub fn with_token_refresh_skew(mut self, skew: Duration) -> Self {
        self.token_refresh_skew = skew;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_cache_entries(mut self, max: usize) -> Self {
        self.max_cache_entries = Some(max);
        self
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `APPDATA_APP_SECRET`: Required - application secret
    /// - `APPDATA_TOKEN_EXCHANGE_URL`: Token exchange base URL
    /// - `APPDATA_ENABLED`: "false" starts the service disabled (default: true)
    /// - `APPDATA_DEFAULT_TTL_SECS`: Default cache TTL, -1/0/positive (default: 86400)
    /// - `APPDATA_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
    /// - `APPDATA_MAX_CACHE_ENTRIES`: Upper bound on cached documents (default: unbounded)
    pub fn from_env() -> DataResult<Self> {
        let app_secret = std::env::var("APPDATA_APP_SECRET").map_err(|_| {
            DataError::Config(ConfigError::MissingRequired {
                field: "APPDATA_APP_SECRET".to_string(),
            })
        })?;

        let mut config = Self::new(app_secret);

        if let Ok(url) = std::env::var("APPDATA_TOKEN_EXCHANGE_URL") {
            config.token_exchange_url = url;
        }

        config.enabled = std::env::var("APPDATA_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        if let Ok(raw) = std::env::var("APPDATA_DEFAULT_TTL_SECS") {
            let seconds = raw.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                field: "APPDATA_DEFAULT_TTL_SECS".to_string(),
                value: raw.clone(),
                reason: "must be an integer".to_string(),
            })?;
            config.default_time_to_live = TimeToLive::from_seconds(seconds)?;
        }

        if let Some(secs) = std::env::var("APPDATA_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.max_cache_entries = std::env::var("APPDATA_MAX_CACHE_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok());

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "app_secret".to_string(),
            });
        }

        if !(self.token_exchange_url.starts_with("https://")
            || self.token_exchange_url.starts_with("http://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "token_exchange_url".to_string(),
                value: self.token_exchange_url.clone(),
                reason: "must be an http(s) URL".to_string(),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout".to_string(),
                value: format!("{:?}", self.request_timeout),
                reason: "request_timeout must be positive".to_string(),
            });
        }

        if self.cosmos_api_version.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cosmos_api_version".to_string(),
            });
        }

        if self.max_cache_entries == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_cache_entries".to_string(),
                value: "0".to_string(),
                reason: "use TimeToLive::NoCache to disable caching".to_string(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for DataConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataConfig")
            .field("app_secret", &"[REDACTED]")
            .field("token_exchange_url", &self.token_exchange_url)
            .field("enabled", &self.enabled)
            .field("default_time_to_live", &self.default_time_to_live)
            .field("token_refresh_skew", &self.token_refresh_skew)
            .field("cosmos_api_version", &self.cosmos_api_version)
            .field("request_timeout", &self.request_timeout)
            .field("max_cache_entries", &self.max_cache_entries)
            .finish()
    }
}
