//! Download job structures and status tracking

use crate::downloader::config::DownloadConfig;
use crate::DownloadMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single download request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Series or chapter URL to download
    pub target_url: String,
    /// Whole series or only the targeted chapter
    pub mode: DownloadMode,
    /// Configuration snapshot taken at creation
    pub config: DownloadConfig,
    /// Current job status
    #[serde(default)]
    pub status: JobStatus,
    /// Job progress tracking
    #[serde(default)]
    pub progress: JobProgress,
}

impl DownloadJob {
    /// Create a pending job
    pub fn new(target_url: impl Into<String>, mode: DownloadMode, config: DownloadConfig) -> Self {
        Self {
            target_url: target_url.into(),
            mode,
            config,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
        }
    }

    /// Validate job parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.target_url.trim().is_empty() {
            return Err("Target URL cannot be empty".to_string());
        }
        self.config.validate()
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job has not started yet
    #[default]
    Pending,
    /// Looking up the connector
    Resolving,
    /// Describing the series and listing pages
    Expanding,
    /// Pages are being fetched
    Running,
    /// Verifying output and writing the manifest
    Finalizing,
    /// Every page was written
    Completed,
    /// Finished with failures, or failed before running
    Failed,
    /// Stopped by a signal or time budget
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Resolving => "resolving",
            JobStatus::Expanding => "expanding",
            JobStatus::Running => "running",
            JobStatus::Finalizing => "finalizing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Page tally for a job
///
/// Counters only grow. `succeeded + failed` never exceeds `total`; skipped
/// pages are already included in `succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobProgress {
    /// Pages planned
    pub total: u64,
    /// Pages on disk (fetched or reused)
    pub succeeded: u64,
    /// Pages that failed
    pub failed: u64,
    /// Pages reused from a previous run
    pub skipped: u64,
}

impl JobProgress {
    /// Progress for `total` planned pages
    pub fn with_total(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Pages that reached a final state
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Pages not yet finished
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.finished())
    }

    /// Calculate download percentage (0.0 to 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.finished() as f64 / self.total as f64) * 100.0
        }
    }

    /// Check if every planned page finished
    pub fn is_complete(&self) -> bool {
        self.finished() >= self.total
    }
}
