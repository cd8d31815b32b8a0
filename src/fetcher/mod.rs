//! Page transport
//!
//! The transport is the explicitly passed session handle that performs the
//! actual network retrieval. The orchestrator opens one [`Session`] per job,
//! threads it through connector and worker calls, and releases it when the
//! job ends.

use crate::connector::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod http;
pub mod retry_formatter;

pub use http::HttpTransport;

/// A single outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Absolute URL
    pub url: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

impl PageRequest {
    /// Create a request without extra headers
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add `Referer` and, when the referer parses, the matching `Origin`
    pub fn with_referer(self, referer: &str) -> Self {
        if referer.is_empty() {
            return self;
        }
        let origin = url::Url::parse(referer)
            .ok()
            .map(|u| u.origin().ascii_serialization())
            .filter(|o| o != "null");
        let request = self.with_header("Referer", referer);
        match origin {
            Some(origin) => request.with_header("Origin", origin),
            None => request,
        }
    }

    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Body and metadata of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Response body
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if present
    pub content_type: Option<String>,
}

impl FetchedPage {
    /// Create a fetched page
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
        }
    }
}

/// Options forwarded opaquely to the transport and connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Run any browser-backed transport without a visible window
    pub headless: bool,
    /// Override the transport's default user agent
    pub user_agent: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
        }
    }
}

/// Retrieval backend shared by connectors and workers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Acquire any per-job resources (browser context, cookies)
    async fn open(&self, _options: &SessionOptions) -> ConnectorResult<()> {
        Ok(())
    }

    /// Perform a GET request and return the body
    async fn fetch(&self, request: &PageRequest) -> ConnectorResult<FetchedPage>;

    /// Perform a GET request and decode the body as UTF-8 text
    async fn fetch_text(&self, request: &PageRequest) -> ConnectorResult<String> {
        let page = self.fetch(request).await?;
        String::from_utf8(page.bytes).map_err(|e| {
            ConnectorError::Extraction(format!("{} is not valid UTF-8: {e}", request.url))
        })
    }

    /// Release per-job resources
    async fn release(&self) {}
}

/// Per-job handle to a transport.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    options: SessionOptions,
}

impl Session {
    /// Open a session on `transport`
    pub async fn open(
        transport: Arc<dyn Transport>,
        options: SessionOptions,
    ) -> ConnectorResult<Self> {
        transport.open(&options).await?;
        Ok(Self { transport, options })
    }

    /// The underlying transport
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Options the session was opened with
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// `request` with the session user agent, unless it already names one
    pub fn prepare(&self, request: &PageRequest) -> PageRequest {
        match &self.options.user_agent {
            Some(agent) if request.header("User-Agent").is_none() => {
                request.clone().with_header("User-Agent", agent.clone())
            }
            _ => request.clone(),
        }
    }

    /// GET through the transport with the session's options applied
    pub async fn fetch(&self, request: &PageRequest) -> ConnectorResult<FetchedPage> {
        self.transport.fetch(&self.prepare(request)).await
    }

    /// Text GET through the transport with the session's options applied
    pub async fn fetch_text(&self, request: &PageRequest) -> ConnectorResult<String> {
        self.transport.fetch_text(&self.prepare(request)).await
    }

    /// Release the transport's per-job resources
    pub async fn release(self) {
        self.transport.release().await;
    }
}
