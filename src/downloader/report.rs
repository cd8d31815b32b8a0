//! Result aggregation and the run report

use crate::downloader::job::{JobProgress, JobStatus};
use crate::downloader::unit::{ErrorKind, FetchResult, UnitId, UnitOutcome};
use crate::DownloadMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Thread-safe sink for unit results
///
/// Results may arrive in any order; they are stored by [`UnitId`] so the
/// report is always in series order. Interrupted units are not recorded and
/// a second result for the same unit is ignored, which keeps the tally
/// monotonic and bounded by the total.
#[derive(Debug)]
pub struct ResultAccumulator {
    inner: Mutex<AccumulatorState>,
}

#[derive(Debug, Default)]
struct AccumulatorState {
    progress: JobProgress,
    results: BTreeMap<UnitId, FetchResult>,
    consecutive_storage_failures: u32,
}

/// Tally after recording one result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// Job progress
    pub progress: JobProgress,
    /// Storage failures since the last non-storage result
    pub consecutive_storage_failures: u32,
    /// False when the result was ignored
    pub counted: bool,
}

impl ResultAccumulator {
    /// Accumulator for `total` planned units
    pub fn new(total: u64) -> Self {
        Self {
            inner: Mutex::new(AccumulatorState {
                progress: JobProgress::with_total(total),
                ..AccumulatorState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AccumulatorState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a unit result
    pub fn record(&self, result: FetchResult) -> RecordSnapshot {
        let mut state = self.state();
        let counted = !matches!(result.outcome, UnitOutcome::Interrupted)
            && !state.results.contains_key(&result.id)
            && state.progress.finished() < state.progress.total;

        if counted {
            match &result.outcome {
                UnitOutcome::Succeeded { reused, .. } => {
                    state.progress.succeeded += 1;
                    if *reused {
                        state.progress.skipped += 1;
                    }
                    state.consecutive_storage_failures = 0;
                }
                UnitOutcome::Failed { .. } => {
                    state.progress.failed += 1;
                    if result.is_storage_failure() {
                        state.consecutive_storage_failures += 1;
                    } else {
                        state.consecutive_storage_failures = 0;
                    }
                }
                UnitOutcome::Interrupted => {}
            }
            state.results.insert(result.id, result);
        }

        RecordSnapshot {
            progress: state.progress,
            consecutive_storage_failures: state.consecutive_storage_failures,
            counted,
        }
    }

    /// Current tally
    pub fn progress(&self) -> JobProgress {
        self.state().progress
    }

    /// All recorded results in series order
    pub fn results(&self) -> BTreeMap<UnitId, FetchResult> {
        self.state().results.clone()
    }
}

/// Per-chapter counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterReport {
    /// 1-based chapter position
    pub index: usize,
    /// Chapter title
    pub title: String,
    /// Chapter URL
    pub url: String,
    /// Output directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Pages planned
    pub total: u64,
    /// Pages on disk
    pub succeeded: u64,
    /// Pages failed
    pub failed: u64,
    /// Pages reused from a previous run
    pub skipped: u64,
    /// Pages never attempted
    pub not_attempted: u64,
    /// Pages reported written but absent at verification
    pub missing: u64,
    /// Chapter-level failure, e.g. page listing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChapterReport {
    /// Every page is on disk and the chapter itself did not fail
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.missing == 0 && self.succeeded == self.total
    }
}

/// A unit that failed, for diagnostics and targeted retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUnit {
    /// Unit identity
    pub id: UnitId,
    /// Page URL
    pub url: String,
    /// Failure category
    pub kind: ErrorKind,
    /// Last error message
    pub message: String,
    /// Attempts made
    pub attempts: u32,
}

/// Summary of one job run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// URL the job was started with
    pub target_url: String,
    /// Download mode
    pub mode: DownloadMode,
    /// Connector that served the job
    pub connector: String,
    /// Series title
    pub series_title: String,
    /// Series output directory
    pub series_dir: PathBuf,
    /// Terminal state
    pub state: JobStatus,
    /// Chapters in series order
    pub chapters: Vec<ChapterReport>,
    /// Failed units in series order
    pub failed_units: Vec<FailedUnit>,
    /// Page tally
    pub totals: JobProgress,
    /// Planned pages that were never attempted
    pub not_attempted: u64,
    /// Why the job stopped early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
}

impl RunReport {
    /// Whether the job finished with every page on disk
    pub fn is_success(&self) -> bool {
        self.state == JobStatus::Completed
    }

    /// Chapters with a chapter-level error
    pub fn failed_chapters(&self) -> impl Iterator<Item = &ChapterReport> {
        self.chapters.iter().filter(|c| c.error.is_some())
    }
}

/// Failed units of `results` in series order
pub fn failed_units(results: &BTreeMap<UnitId, FetchResult>) -> Vec<FailedUnit> {
    results
        .values()
        .filter_map(|result| match &result.outcome {
            UnitOutcome::Failed { kind, message } => Some(FailedUnit {
                id: result.id,
                url: result.source_url.clone(),
                kind: *kind,
                message: message.clone(),
                attempts: result.attempts,
            }),
            _ => None,
        })
        .collect()
}
