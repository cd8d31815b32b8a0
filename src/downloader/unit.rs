//! Fetch units and their outcomes

use crate::fetcher::PageRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identity of a page within a job: 1-based chapter and page positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    /// Chapter position in the series
    pub chapter: usize,
    /// Page position in the chapter
    pub page: usize,
}

impl UnitId {
    /// Create a unit id
    pub fn new(chapter: usize, page: usize) -> Self {
        Self { chapter, page }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{:03}/p{:03}", self.chapter, self.page)
    }
}

/// Where a page will be stored: directory plus extension-less file stem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageDestination {
    /// Chapter directory
    pub directory: PathBuf,
    /// File name without extension (e.g. `007`)
    pub stem: String,
}

impl PageDestination {
    /// Create a destination
    pub fn new(directory: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            stem: stem.into(),
        }
    }

    /// Full path for a given extension
    pub fn path_with_extension(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", self.stem, extension))
    }
}

/// One page to download
#[derive(Debug, Clone)]
pub struct FetchUnit {
    /// Unit identity
    pub id: UnitId,
    /// Request for the page image, including referer headers
    pub request: PageRequest,
    /// Target location
    pub destination: PageDestination,
}

impl FetchUnit {
    /// Create a unit
    pub fn new(id: UnitId, request: PageRequest, destination: PageDestination) -> Self {
        Self {
            id,
            request,
            destination,
        }
    }

    /// Source URL of the page
    pub fn source_url(&self) -> &str {
        &self.request.url
    }
}

/// Failure category recorded for a unit or chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connector could not extract data
    Extraction,
    /// Retryable network failure
    TransientNetwork,
    /// Request timed out
    Timeout,
    /// Server rejected the request
    Rejected,
    /// Payload was not a usable image
    Validation,
    /// Local write failed
    Storage,
}

impl ErrorKind {
    /// What the user can try after pages failed with this kind
    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorKind::Extraction => "The site layout may have changed; update the connector",
            ErrorKind::TransientNetwork => {
                "Check connectivity, or raise --delay-ms and lower --concurrency if the site throttles"
            }
            ErrorKind::Timeout => "Increase --timeout-secs or check your connection",
            ErrorKind::Rejected => "The page may have been removed or moved",
            ErrorKind::Validation => {
                "The site served a non-image page; it may require cookies or a visible browser (--visible)"
            }
            ErrorKind::Storage => "Check free disk space and permissions of the output directory",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Extraction => "extraction",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
        };
        write!(f, "{s}")
    }
}

/// How a unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Page is on disk
    Succeeded {
        /// Final path
        path: PathBuf,
        /// Size in bytes
        bytes: u64,
        /// True when an existing file was kept instead of fetching
        reused: bool,
    },
    /// All attempts failed
    Failed {
        /// Failure category of the last attempt
        kind: ErrorKind,
        /// Last error message
        message: String,
    },
    /// Cancelled before finishing; counts as not attempted
    Interrupted,
}

/// Result reported by the worker pool for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Unit identity
    pub id: UnitId,
    /// Page URL
    pub source_url: String,
    /// Outcome
    pub outcome: UnitOutcome,
    /// Attempts made (0 when reused or interrupted before the first)
    pub attempts: u32,
}

impl FetchResult {
    /// True when the failure came from the storage writer
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self.outcome,
            UnitOutcome::Failed {
                kind: ErrorKind::Storage,
                ..
            }
        )
    }
}
