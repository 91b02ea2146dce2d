//! HTTP client for the storefront REST API.
//!
//! `HttpClient` is the seam the session manager talks through; `ApiClient`
//! is the reqwest-backed implementation used outside of tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde_json::Value;
use tracing::debug;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Performs JSON requests against the API.
///
/// Implementations return the parsed body on 2xx, `ApiError::Status` with the
/// parsed body on non-2xx, and `ApiError::Transport` when the server could not
/// be reached.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, method: Method, path: &str, body: Option<Value>)
        -> Result<Value, ApiError>;

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }
}

/// API client for the storefront backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn default_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn parse_body(text: &str) -> Result<Value, ApiError> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl HttpClient for ApiClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(%method, url = %url, "Sending API request");

        let mut request = self
            .client
            .request(method, &url)
            .headers(Self::default_headers());
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        Self::parse_body(&text)
    }
}
