//! # Comic Downloader Library
//!
//! Download orchestration for comic and manga sites. Site-specific extraction
//! lives in connectors; this crate resolves a target URL to a content tree,
//! schedules rate-limited concurrent page fetches and writes a complete,
//! resumable and verifiable directory tree.
//!
//! ## Features
//!
//! - **Pluggable Connectors**: Sites implement [`connector::Connector`] and are
//!   registered by domain in a [`registry::ConnectorRegistry`]
//! - **Rate Limiting**: Minimum spacing between requests per connector
//! - **Bounded Concurrency**: A small worker pool with retry and backoff
//! - **Resume Capability**: Pages already on disk are skipped on the next run
//! - **Atomic Output**: Pages are written to a temp file and renamed into place
//! - **Run Reports**: Per-chapter counts and a list of failed pages
//!
//! ## Quick Start
//!
//! ```no_run
//! use comic_downloader::downloader::{DownloadConfig, DownloadExecutor, DownloadJob};
//! use comic_downloader::registry::ConnectorRegistry;
//! use comic_downloader::DownloadMode;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConnectorRegistry::builder().build();
//! let executor = DownloadExecutor::new(registry.into());
//!
//! let job = DownloadJob::new(
//!     "https://truyenqqno.com/truyen-tranh/onepunch-man-244",
//!     DownloadMode::WholeSeries,
//!     DownloadConfig::default(),
//! );
//! let report = executor.execute(job).await?;
//! println!("{} pages written", report.totals.succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`registry`] - Domain → connector lookup
//! - [`connector`] - Capability contract consumed from site modules
//! - [`fetcher`] - Transport used to retrieve page bytes
//! - [`downloader`] - Job state machine, worker pool and rate limiting
//! - [`output`] - Path layout and atomic storage writer
//! - [`resume`] - Run manifest persisted next to the downloaded pages

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Connector capability interface
pub mod connector;

/// Download orchestration
pub mod downloader;

/// Page transport
pub mod fetcher;

/// Metrics collection
pub mod metrics;

/// Output layout and storage writer
pub mod output;

/// Domain registry of connectors
pub mod registry;

/// Run manifest for resume and verification
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use connector::{Connector, ConnectorError, ConnectorHandle};
pub use downloader::{DownloadConfig, DownloadExecutor, DownloadJob, RunReport};
pub use registry::ConnectorRegistry;

/// A comic series as described by a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    /// Site-assigned id or the landing URL
    pub id: String,
    /// Display title
    pub title: String,
    /// Landing page URL
    pub url: String,
    /// Chapters in the site's presentation order
    pub chapters: Vec<Chapter>,
}

impl Series {
    /// Build a series, stamping every chapter with its 1-based position and a
    /// back-reference to this series.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        chapters: Vec<Chapter>,
    ) -> Self {
        let mut series = Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            chapters,
        };
        series.renumber();
        series
    }

    /// Number chapters by their position in `chapters` and point them back at
    /// this series. Connector-assigned positions are not trusted.
    pub fn renumber(&mut self) {
        for (i, chapter) in self.chapters.iter_mut().enumerate() {
            chapter.index = i + 1;
            chapter.series_id.clone_from(&self.id);
        }
    }

    /// Find a chapter by its URL, ignoring a trailing slash and fragment.
    pub fn chapter_by_url(&self, url: &str) -> Option<&Chapter> {
        let wanted = normalize_url(url);
        self.chapters.iter().find(|c| normalize_url(&c.url) == wanted)
    }

    /// Validate the content tree returned by a connector
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Series title cannot be empty".to_string());
        }

        if self.chapters.is_empty() {
            return Err(format!("Series '{}' has no chapters", self.title));
        }

        Ok(())
    }
}

/// A chapter of a series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// Site-assigned chapter id
    pub id: String,
    /// Display title (e.g. "Chapter 12 - The Return")
    pub title: String,
    /// Chapter reader URL
    pub url: String,
    /// 1-based position within the series, assigned by [`Series::renumber`]
    #[serde(default)]
    pub index: usize,
    /// Id of the owning series
    #[serde(default)]
    pub series_id: String,
    /// Page image URLs in reading order; `None` when they must be listed lazily
    #[serde(default)]
    pub pages: Option<Vec<String>>,
}

impl Chapter {
    /// Create a chapter whose pages will be listed lazily
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            index: 0,
            series_id: String::new(),
            pages: None,
        }
    }

    /// Attach an eagerly extracted page list
    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.pages = Some(pages);
        self
    }
}

/// What part of a series a job downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadMode {
    /// Only the chapter the target URL points at
    SingleChapter,
    /// Every chapter of the series
    #[default]
    WholeSeries,
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadMode::SingleChapter => "single-chapter",
            DownloadMode::WholeSeries => "whole-series",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DownloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single-chapter" | "chapter" => Ok(DownloadMode::SingleChapter),
            "whole-series" | "series" => Ok(DownloadMode::WholeSeries),
            _ => Err(format!(
                "Invalid download mode: {s}. Valid options: single-chapter, whole-series"
            )),
        }
    }
}

fn normalize_url(url: &str) -> &str {
    let url = url.split('#').next().unwrap_or(url);
    url.trim_end_matches('/')
}
