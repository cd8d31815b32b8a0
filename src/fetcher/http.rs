//! reqwest-backed transport
//!
//! Plain HTTP GET with a per-request timeout. Retries are the worker pool's
//! job, so a single call here performs exactly one request. Bodies are read
//! chunk by chunk and rejected once they grow past the configured cap.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::connector::{ConnectorError, ConnectorResult};
use crate::fetcher::retry_formatter::RetryErrorType;
use crate::fetcher::{FetchedPage, PageRequest, SessionOptions, Transport};

/// Default user agent sent when the session does not override it
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Largest body accepted by default, in bytes
pub const MAX_PAGE_BYTES: u64 = 64 * 1024 * 1024;

/// HTTP transport built on a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    user_agent: String,
    max_body_bytes: u64,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> ConnectorResult<Self> {
        Self::with_user_agent(timeout, DEFAULT_USER_AGENT)
    }

    /// Create a transport with a custom user agent
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> ConnectorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| ConnectorError::TransientNetwork(format!("HTTP client init: {e}")))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            max_body_bytes: MAX_PAGE_BYTES,
        })
    }

    /// Reject bodies larger than `max` bytes
    pub fn with_max_body_bytes(mut self, max: u64) -> Self {
        self.max_body_bytes = max;
        self
    }

    fn too_large(&self, url: &str) -> ConnectorError {
        ConnectorError::Validation(format!(
            "{url}: response body exceeds {} bytes",
            self.max_body_bytes
        ))
    }

    fn headers(&self, request: &PageRequest) -> ConnectorResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| ConnectorError::Validation(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, agent);

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConnectorError::Validation(format!("invalid header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConnectorError::Validation(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, options: &SessionOptions) -> ConnectorResult<()> {
        if !options.headless {
            debug!("HTTP transport has no visible mode; ignoring headless=false");
        }
        Ok(())
    }

    async fn fetch(&self, request: &PageRequest) -> ConnectorResult<FetchedPage> {
        let headers = self.headers(request)?;
        debug!(url = %request.url, "GET");

        let mut response = self
            .client
            .get(&request.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                RetryErrorType::from_reqwest_error(&e).into_connector_error(&request.url, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetryErrorType::from_status(status)
                .into_connector_error(&request.url, format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let declared = response.content_length();
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            return Err(self.too_large(&request.url));
        }

        let capacity = declared.unwrap_or(0).min(self.max_body_bytes);
        let mut body = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            RetryErrorType::from_reqwest_error(&e).into_connector_error(&request.url, e.to_string())
        })? {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(self.too_large(&request.url));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage::new(body, content_type))
    }
}
