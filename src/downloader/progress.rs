//! Progress tracking for long-running downloads.
//!
//! Holds the counters behind the periodic `[PROGRESS]` log lines: percentage,
//! page rate and remaining-time estimate.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const MIN_DOWNLOAD_DURATION: Duration = Duration::from_secs(30);

/// Lightweight builder that controls update cadence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] configured with the tracker defaults.
    pub fn create_state(&self, total_pages: u64) -> ProgressState {
        let mut state = ProgressState::new(total_pages);
        state.update_interval = self.update_interval;
        state.min_percentage_step = self.min_percentage_step;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, 10.0)
    }
}

/// Progress state for one job.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Pages that reached a final state.
    pub pages_done: u64,
    /// Pages fetched over the network (excludes reused files).
    pub pages_fetched: u64,
    /// Pages planned.
    pub total_pages: u64,
    /// Timestamp when download started.
    pub start_time: Instant,
    /// Last time progress was reported.
    pub last_update: Instant,
    /// Minimum interval between progress updates.
    pub update_interval: Duration,
    /// Fetch rate (pages per second).
    pub current_rate: f64,
    /// Chapter currently being processed.
    pub current_phase: Option<String>,
    /// Last reported completion percentage for step-based emission.
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Create a new progress state with default intervals.
    pub fn new(total_pages: u64) -> Self {
        let now = Instant::now();
        Self {
            pages_done: 0,
            pages_fetched: 0,
            total_pages,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            current_phase: None,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Record a finished page; `fetched` is false for reused files.
    pub fn update(&mut self, fetched: bool) {
        self.pages_done = self.pages_done.saturating_add(1);
        if fetched {
            self.pages_fetched = self.pages_fetched.saturating_add(1);
        }
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.pages_fetched as f64 / elapsed;
        }
    }

    /// Whether a progress update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.pages_done == 0 {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.start_time.elapsed() >= MIN_DOWNLOAD_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log to reset timers and cached percentage.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Set descriptive phase label (e.g., "chapter 3/12").
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(|s| s.into());
    }

    /// Download percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_pages == 0 {
            return 100.0;
        }
        (self.pages_done as f64 / self.total_pages as f64) * 100.0
    }

    /// Estimate remaining time from the current fetch rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate <= 0.0 {
            return None;
        }
        let remaining = self.total_pages.saturating_sub(self.pages_done);
        if remaining == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / self.current_rate))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Downloaded {}/{} pages",
            self.pages_done, self.total_pages
        )];

        parts.push(format!("- {:.1}% complete", self.percentage()));

        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.1} pages/sec", self.current_rate));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
