//! Integration tests for logging and tracing

use comic_downloader::downloader::progress::ProgressState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[test]
fn test_tracing_subscriber_initialization() {
    // Another test may have installed a subscriber already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("comic_downloader=debug")),
        )
        .with_test_writer()
        .try_init();

    info!(connector = "mock", pages = 6, "Starting page downloads");
    warn!(unit = "c001/p002", "Retrying page");
}

#[test]
fn test_tracing_json_format() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("comic_downloader=info"))
        .with_test_writer()
        .try_init();

    let span = tracing::info_span!("execute_job", url = "https://example.com/x", mode = "whole-series");
    let _enter = span.enter();
    info!("Inside span");
}

#[test]
fn test_env_filter_parsing() {
    for directive in [
        "info",
        "comic_downloader=debug",
        "warn,comic_downloader::downloader=trace",
    ] {
        assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
    }
}

#[test]
fn test_progress_line_format() {
    let mut state = ProgressState::new(10);
    for _ in 0..4 {
        state.update(true);
    }
    let line = state.format_progress();
    assert!(line.starts_with("[PROGRESS] Downloaded 4/10 pages"), "{line}");
    assert!(line.contains("- 40.0% complete"), "{line}");
}
