//! Storage failures abort the job once they keep repeating

use crate::support::{self, MockConnector, MockTransport};
use comic_downloader::downloader::{DownloadExecutor, DownloadJob, ErrorKind, JobStatus};
use comic_downloader::shutdown::ShutdownCoordinator;
use comic_downloader::DownloadMode;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_repeated_storage_failures_abort_job() {
    let dir = TempDir::new().unwrap();
    // A regular file where the output root should be makes every write fail.
    let root = dir.path().join("not-a-directory");
    std::fs::write(&root, b"occupied").unwrap();

    let connector = Arc::new(MockConnector::new(vec![10]));
    let transport = MockTransport::new();
    let config = support::config(&root)
        .with_concurrency(1)
        .with_storage_failure_threshold(3);
    let job = DownloadJob::new(support::SERIES_URL, DownloadMode::WholeSeries, config);

    let report = DownloadExecutor::new(support::registry(connector))
        .with_transport(transport.clone())
        .with_shutdown(ShutdownCoordinator::shared())
        .execute(job)
        .await
        .unwrap();

    assert_eq!(report.state, JobStatus::Failed);
    assert!(report
        .aborted
        .as_deref()
        .is_some_and(|reason| reason.contains("consecutive storage failures")));
    assert!(report.totals.failed >= 3);
    assert!(report
        .failed_units
        .iter()
        .all(|unit| unit.kind == ErrorKind::Storage));
    assert!(transport.total_calls() < 10, "job kept fetching after the abort");
    assert!(report.not_attempted > 0);
}
