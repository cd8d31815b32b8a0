//! Download metrics
//!
//! Counters and histograms for page throughput, retries and rate limiter
//! waits. Recording is always cheap; nothing is exported unless
//! [`init_metrics`] installed the Prometheus listener.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::downloader::job::JobStatus;
use crate::downloader::unit::ErrorKind;

static METRICS_INITIALIZED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Metrics errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter on {addr}: {message}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Exporter error text
        message: String,
    },
}

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are no-ops once an exporter is installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.lock().unwrap_or_else(|e| e.into_inner());
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            message: e.to_string(),
        })?;

    describe_counter!(
        "pages_downloaded_total",
        Unit::Count,
        "Pages fetched and written to disk"
    );
    describe_counter!(
        "pages_failed_total",
        Unit::Count,
        "Pages that failed after all attempts"
    );
    describe_counter!(
        "pages_skipped_total",
        Unit::Count,
        "Pages reused from a previous run"
    );
    describe_counter!("page_bytes_total", Unit::Bytes, "Bytes written for pages");
    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Retry attempts after transient failures"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for the per-site rate limiter"
    );
    describe_counter!(
        "jobs_completed_total",
        Unit::Count,
        "Download jobs by terminal state"
    );

    *initialized = true;
    info!("Metrics system initialized on {}", addr);
    Ok(())
}

/// Record a page written to disk
pub fn record_page_downloaded(connector: &str, bytes: u64) {
    counter!("pages_downloaded_total", "connector" => connector.to_string()).increment(1);
    counter!("page_bytes_total", "connector" => connector.to_string()).increment(bytes);
}

/// Record a page reused from disk
pub fn record_page_skipped(connector: &str) {
    counter!("pages_skipped_total", "connector" => connector.to_string()).increment(1);
}

/// Record a page that gave up
pub fn record_page_failed(connector: &str, kind: ErrorKind) {
    counter!(
        "pages_failed_total",
        "connector" => connector.to_string(),
        "kind" => kind.to_string(),
    )
    .increment(1);
}

/// Record a retry and its backoff
pub fn record_retry(connector: &str, attempt: u32, backoff: Duration) {
    counter!("fetch_retries_total", "connector" => connector.to_string()).increment(1);
    debug!(
        connector = connector,
        attempt = attempt,
        backoff_ms = backoff.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record time spent in the rate limiter
pub fn record_rate_limit_wait(key: &str, waited: Duration) {
    histogram!("rate_limit_wait_seconds", "connector" => key.to_string())
        .record(waited.as_secs_f64());
}

/// Record a finished job
pub fn record_job(state: JobStatus) {
    counter!("jobs_completed_total", "state" => state.to_string()).increment(1);
}
