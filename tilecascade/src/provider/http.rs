//! HTTP client abstraction for testability

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderName, CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED};
use tracing::{debug, trace, warn};

use super::types::ProviderError;
use crate::cache::Freshness;

/// Default User-Agent. Public tile servers reject requests without one.
pub const DEFAULT_USER_AGENT: &str = concat!("tilecascade/", env!("CARGO_PKG_VERSION"));

/// Body and caching metadata of a successful GET.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub body: Bytes,
    /// `ETag`, or `Last-Modified` when there is no ETag.
    pub validator: Option<String>,
    pub freshness: Freshness,
}

impl HttpResponse {
    /// A response with no caching headers.
    pub fn from_body(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Trait for asynchronous HTTP client operations.
///
/// Allows the downloader to run against a mock client in tests.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an async HTTP GET request.
    ///
    /// Non-success statuses are errors.
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, ProviderError>> + Send;
}

impl<T: AsyncHttpClient> AsyncHttpClient for Arc<T> {
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, ProviderError>> + Send {
        self.as_ref().get(url)
    }
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a client with a 30 second timeout and the default User-Agent.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_settings(Duration::from_secs(30), DEFAULT_USER_AGENT)
    }

    /// Creates a client with a custom timeout and User-Agent.
    pub fn with_settings(timeout: Duration, user_agent: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ProviderError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, ProviderError> {
        trace!(url = url, "HTTP GET request starting");

        let response = match self.client.get(url).send().await {
            Ok(resp) => {
                debug!(url = url, status = resp.status().as_u16(), "HTTP response received");
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(ProviderError::HttpError(format!("Request failed: {}", e)));
            }
        };

        if !response.status().is_success() {
            warn!(url = url, status = response.status().as_u16(), "HTTP error status");
            return Err(ProviderError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let headers = response.headers();
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let validator = header(ETAG).or_else(|| header(LAST_MODIFIED));
        let freshness = Freshness::from_headers(
            header(CACHE_CONTROL).as_deref(),
            header(EXPIRES).as_deref(),
        );

        let body = response.bytes().await.map_err(|e| {
            warn!(url = url, error = %e, "Failed to read response body");
            ProviderError::HttpError(format!("Failed to read response: {}", e))
        })?;

        trace!(url = url, bytes = body.len(), "HTTP GET complete");
        Ok(HttpResponse {
            body,
            validator,
            freshness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("tilecascade/"));
    }

    #[test]
    fn test_client_builds() {
        assert!(AsyncReqwestClient::new().is_ok());
        assert!(AsyncReqwestClient::with_settings(Duration::from_secs(5), "test-agent").is_ok());
    }

    #[test]
    fn test_response_from_body() {
        let response = HttpResponse::from_body(vec![1, 2, 3]);
        assert_eq!(response.body.as_ref(), &[1, 2, 3]);
        assert!(response.validator.is_none());
        assert_eq!(response.freshness, Freshness::default());
    }
}
