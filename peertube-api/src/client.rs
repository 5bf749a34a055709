use crate::error::ApiResult;
use reqwest::Client as HttpClient;
use reqwest::redirect::Policy;
use std::time::Duration;

const API_PREFIX: &str = "/api/v1";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the PeerTube instance (e.g., "http://peertube.localhost:9000")
    pub base_url: String,
    /// Overall timeout for a single request in seconds
    pub timeout_seconds: u64,
    /// Connect timeout in seconds
    pub connect_timeout_seconds: u64,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_seconds: 600,
            connect_timeout_seconds: 30,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, connect_timeout_seconds: u64) -> Self {
        self.connect_timeout_seconds = connect_timeout_seconds;
        self
    }
}

/// PeerTube API client
///
/// Holds the HTTP connection pool and the instance address. Credentials are
/// kept separately in [`crate::CredentialStore`] so many workers can share one
/// token lifecycle.
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) http_client: HttpClient,
}

impl Client {
    /// Create a new API client
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        // 308 is the resumable protocol's "continue" status, never a redirect
        let http_client = HttpClient::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .redirect(Policy::none())
            .pool_max_idle_per_host(100)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Base URL of the instance, without the API prefix
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Build the full URL for an API endpoint
    pub(crate) fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.config.base_url, API_PREFIX, path)
    }
}
