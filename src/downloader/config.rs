//! Download configuration constants and the per-job config snapshot

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of pages fetched concurrently.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Upper bound accepted for `--concurrency`.
/// Comic sites throttle aggressively; more workers mostly buy 429s.
pub const MAX_CONCURRENCY: usize = 32;

/// Default number of retries for transient page failures.
///
/// Retries follow the first attempt, so a page gets up to four requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default minimum spacing between two requests to the same site.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default timeout for `describe` and `list_pages` calls.
pub const DEFAULT_CONNECTOR_TIMEOUT_SECS: u64 = 120;

/// Consecutive storage failures after which a job is aborted.
pub const DEFAULT_STORAGE_FAILURE_THRESHOLD: u32 = 5;

/// How long in-flight pages may finish after cancellation.
pub const DEFAULT_CANCEL_GRACE_SECS: u64 = 10;

/// Largest page body accepted from a site, in bytes.
pub const DEFAULT_MAX_PAGE_BYTES: u64 = crate::fetcher::http::MAX_PAGE_BYTES;

/// Default output root
pub const DEFAULT_OUTPUT_ROOT: &str = "downloads";

/// `initial * 2^retry_count`, capped at `max`
pub fn backoff_between(initial: Duration, max: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry_count.min(16));
    initial.saturating_mul(factor).min(max)
}

/// Configuration snapshot taken when a job is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum pages in flight
    pub concurrency: usize,
    /// Minimum spacing between requests to one site
    pub request_delay: Duration,
    /// Retries for transient failures after the first attempt
    ///
    /// A unit is requested at most `max_retries + 1` times: with the default
    /// of 3 a page that keeps failing is fetched four times before it is
    /// reported as failed. `0` disables retries.
    pub max_retries: u32,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Backoff cap
    pub max_backoff: Duration,
    /// Timeout of a single page request
    pub request_timeout: Duration,
    /// Timeout of a single describe/list_pages call
    pub connector_timeout: Duration,
    /// Root directory for downloaded series
    pub output_root: PathBuf,
    /// Re-download pages that already exist on disk
    pub overwrite: bool,
    /// Forwarded to the transport
    pub headless: bool,
    /// User agent sent with every request instead of the transport default
    pub user_agent: Option<String>,
    /// Largest accepted page body
    pub max_page_bytes: u64,
    /// Consecutive storage failures tolerated before aborting
    pub storage_failure_threshold: u32,
    /// Drain period for in-flight pages after cancellation
    pub cancel_grace: Duration,
    /// Cancel the job once this much time has elapsed
    pub time_budget: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connector_timeout: Duration::from_secs(DEFAULT_CONNECTOR_TIMEOUT_SECS),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            overwrite: false,
            headless: true,
            user_agent: None,
            max_page_bytes: DEFAULT_MAX_PAGE_BYTES,
            storage_failure_threshold: DEFAULT_STORAGE_FAILURE_THRESHOLD,
            cancel_grace: Duration::from_secs(DEFAULT_CANCEL_GRACE_SECS),
            time_budget: None,
        }
    }
}

impl DownloadConfig {
    /// Set concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-site request spacing
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set backoff bounds
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the describe/list_pages timeout
    pub fn with_connector_timeout(mut self, timeout: Duration) -> Self {
        self.connector_timeout = timeout;
        self
    }

    /// Set the output root
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Enable or disable overwriting existing pages
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Headless toggle forwarded to the transport
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Send `user_agent` instead of the transport default
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Set the largest accepted page body
    pub fn with_max_page_bytes(mut self, max: u64) -> Self {
        self.max_page_bytes = max;
        self
    }

    /// Set the storage failure threshold
    pub fn with_storage_failure_threshold(mut self, threshold: u32) -> Self {
        self.storage_failure_threshold = threshold;
        self
    }

    /// Set the cancellation grace period
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Set an overall time budget
    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    /// Backoff before retry number `retry_count` (0-based)
    pub fn backoff(&self, retry_count: u32) -> Duration {
        backoff_between(self.initial_backoff, self.max_backoff, retry_count)
    }

    /// Total attempts per unit: the first one plus `max_retries`
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            ));
        }
        if self.request_timeout.is_zero() {
            return Err("request timeout must be greater than zero".to_string());
        }
        if self.connector_timeout.is_zero() {
            return Err("connector timeout must be greater than zero".to_string());
        }
        if self.initial_backoff > self.max_backoff {
            return Err("initial backoff cannot exceed the backoff cap".to_string());
        }
        if self.max_page_bytes == 0 {
            return Err("max page size must be greater than zero".to_string());
        }
        if self
            .user_agent
            .as_deref()
            .is_some_and(|agent| agent.trim().is_empty())
        {
            return Err("user agent cannot be blank".to_string());
        }
        if self.storage_failure_threshold == 0 {
            return Err("storage failure threshold must be at least 1".to_string());
        }
        if self.output_root.as_os_str().is_empty() {
            return Err("output root cannot be empty".to_string());
        }
        Ok(())
    }
}
