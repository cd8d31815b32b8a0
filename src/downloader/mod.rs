//! Download orchestration and rate limiting
//!
//! This module provides the core download execution engine: connector
//! resolution, content expansion, bounded concurrent page fetching with
//! retries, and the final run report.
//!
//! # Overview
//!
//! 1. **Job Creation**: Define what to download using [`job::DownloadJob`]
//! 2. **Execution**: Process the job using [`executor::DownloadExecutor`]
//! 3. **Rate Limiting**: Per-site spacing via [`rate_limit::RateLimiter`]
//! 4. **Worker Pool**: Bounded concurrency and retries in [`pool::WorkerPool`]
//! 5. **Reporting**: Results aggregate into a [`report::RunReport`]
//!
//! # Quick Start
//!
//! ```no_run
//! use comic_downloader::downloader::{DownloadConfig, DownloadExecutor, DownloadJob};
//! use comic_downloader::registry::ConnectorRegistry;
//! use comic_downloader::DownloadMode;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ConnectorRegistry::builder().build());
//! let config = DownloadConfig::default().with_output_root("./downloads");
//! let job = DownloadJob::new(
//!     "https://example.com/manga/some-title/chapter-1",
//!     DownloadMode::SingleChapter,
//!     config,
//! );
//!
//! let report = DownloadExecutor::new(registry).execute(job).await?;
//! println!("{}: {} failed", report.state, report.totals.failed);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Problems that stop a job before any page is fetched (unsupported site,
//! invalid configuration, a series that cannot be described) return
//! [`DownloadError`]. Once pages are being fetched every failure is recorded
//! in the [`RunReport`] instead.

pub mod config;
pub mod executor;
pub mod job;
pub mod pool;
pub mod progress;
pub mod rate_limit;
pub mod report;
pub mod unit;

pub use config::DownloadConfig;
pub use executor::DownloadExecutor;
pub use job::{DownloadJob, JobProgress, JobStatus};
pub use pool::WorkerPool;
pub use rate_limit::RateLimiter;
pub use report::{ChapterReport, FailedUnit, RunReport};
pub use unit::{ErrorKind, FetchResult, FetchUnit, UnitId, UnitOutcome};

use crate::connector::ConnectorError;
use crate::registry::RegistryError;

/// Job-level download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// No connector serves the target host
    #[error("unsupported site: {0}")]
    UnsupportedSite(String),

    /// Target is not a usable URL
    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    /// Invalid job configuration or registry setup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The series could not be described
    #[error("failed to describe {url}: {source}")]
    Describe {
        /// Target URL
        url: String,
        /// Connector failure
        source: ConnectorError,
    },

    /// Single-chapter mode and the target matches no chapter
    #[error("no chapter of the series matches {0}")]
    ChapterNotFound(String),

    /// Two pages map to the same destination
    #[error("expansion error: {0}")]
    Expansion(String),

    /// The transport session could not be opened
    #[error("session error: {0}")]
    Session(ConnectorError),
}

impl From<RegistryError> for DownloadError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnsupportedSite(host) => DownloadError::UnsupportedSite(host),
            RegistryError::InvalidUrl { url, reason } => {
                DownloadError::InvalidUrl(format!("{url}: {reason}"))
            }
            RegistryError::Configuration(message) => DownloadError::Configuration(message),
        }
    }
}
