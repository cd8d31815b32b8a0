//! Connector capability interface
//!
//! A connector knows how to read one family of sites. The download engine
//! never parses markup itself: it asks a connector to [`Connector::describe`]
//! a landing URL, to [`Connector::list_pages`] of chapters that were not
//! populated eagerly, and to fetch individual page images.
//!
//! Connectors receive an explicit [`Session`] on every call instead of
//! holding on to a shared browser or HTTP handle.

use crate::downloader::unit::ErrorKind;
use crate::fetcher::{FetchedPage, PageRequest, Session};
use crate::{Chapter, Series};
use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Connector errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// Site markup was not recognized or did not contain the expected data
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Site unreachable, reset connection, 5xx, 429 or a throttling 403
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Request did not complete in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// Server refused the request with a non-retryable status
    #[error("request rejected with HTTP {status}: {url}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Response arrived but is not a usable page image
    #[error("validation error: {0}")]
    Validation(String),
}

impl ConnectorError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::TransientNetwork(_) | ConnectorError::Timeout(_)
        )
    }

    /// Error kind recorded in run reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Extraction(_) => ErrorKind::Extraction,
            ConnectorError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            ConnectorError::Timeout(_) => ErrorKind::Timeout,
            ConnectorError::Rejected { .. } => ErrorKind::Rejected,
            ConnectorError::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Site-specific extraction module.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable connector name, also used as the rate limiter key
    fn name(&self) -> &str;

    /// Domains served by this connector (e.g. `truyenqqno.com`)
    fn domains(&self) -> Vec<String>;

    /// Resolve a series or chapter landing URL to its content tree
    ///
    /// At minimum the chapter list must be present; page lists may be left as
    /// `None` and are then requested through [`Connector::list_pages`].
    async fn describe(&self, url: &str, session: &Session) -> ConnectorResult<Series>;

    /// List page image URLs of a chapter in reading order
    async fn list_pages(&self, chapter: &Chapter, session: &Session)
        -> ConnectorResult<Vec<String>>;

    /// Build the request used to download one page of `chapter`
    ///
    /// The default sends the chapter URL as `Referer` and its origin as
    /// `Origin`, which most image hosts require.
    fn page_request(&self, chapter: &Chapter, page_url: &str) -> PageRequest {
        PageRequest::new(page_url).with_referer(&chapter.url)
    }

    /// Download one page image
    async fn fetch_page(
        &self,
        request: &PageRequest,
        session: &Session,
    ) -> ConnectorResult<FetchedPage> {
        session.fetch(request).await
    }
}

/// A resolved connector together with its rate limiter key.
#[derive(Clone)]
pub struct ConnectorHandle {
    key: String,
    connector: Arc<dyn Connector>,
}

impl ConnectorHandle {
    /// Wrap a connector; the key is its lowercase name
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            key: connector.name().to_lowercase(),
            connector,
        }
    }

    /// Rate limiter key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Deref for ConnectorHandle {
    type Target = dyn Connector;

    fn deref(&self) -> &Self::Target {
        self.connector.as_ref()
    }
}

impl fmt::Debug for ConnectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorHandle")
            .field("key", &self.key)
            .field("domains", &self.connector.domains())
            .finish()
    }
}
