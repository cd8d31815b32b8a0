//! End-to-end downloads against the in-memory connector

use crate::support::{self, Behavior, MockConnector, MockTransport, SERIES_TITLE};
use comic_downloader::connector::ConnectorError;
use comic_downloader::downloader::{
    DownloadError, DownloadExecutor, DownloadJob, ErrorKind, JobStatus, UnitId,
};
use comic_downloader::shutdown::ShutdownCoordinator;
use comic_downloader::DownloadMode;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn executor(connector: &Arc<MockConnector>, transport: &Arc<MockTransport>) -> DownloadExecutor {
    DownloadExecutor::new(support::registry(connector.clone()))
        .with_transport(transport.clone())
        .with_shutdown(ShutdownCoordinator::shared())
}

#[tokio::test]
async fn test_two_chapters_all_pages_succeed() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3, 3]));
    let transport = MockTransport::new();

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Completed);
    assert!(report.is_success());
    assert_eq!(report.series_title, SERIES_TITLE);
    assert_eq!(report.connector, "Mock");
    assert_eq!(report.totals.total, 6);
    assert_eq!(report.totals.succeeded, 6);
    assert_eq!(report.totals.failed, 0);
    assert_eq!(report.not_attempted, 0);
    assert!(report.failed_units.is_empty());
    assert_eq!(report.chapters.len(), 2);
    for chapter in &report.chapters {
        assert_eq!((chapter.total, chapter.succeeded, chapter.failed), (3, 3, 0));
        assert!(chapter.is_complete());
    }

    let series_dir = dir.path().join(SERIES_TITLE);
    assert_eq!(report.series_dir, series_dir);
    assert_eq!(
        support::page_files(&series_dir),
        vec![
            "001 - Chapter 1/001.jpg",
            "001 - Chapter 1/002.jpg",
            "001 - Chapter 1/003.jpg",
            "002 - Chapter 2/001.jpg",
            "002 - Chapter 2/002.jpg",
            "002 - Chapter 2/003.jpg",
        ]
    );
    let bytes = std::fs::read(series_dir.join("001 - Chapter 1/002.jpg")).unwrap();
    assert_eq!(bytes, support::JPEG);
    assert_eq!(transport.total_calls(), 6);
    assert_eq!(connector.describe_calls(), 1);
}

#[tokio::test]
async fn test_single_transient_failure_fails_job_but_keeps_siblings() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3, 3]));
    let transport = MockTransport::new();
    let broken = support::page_url(1, 2);
    transport.set_behavior(&broken, Behavior::TransientThenOk(u32::MAX));

    let config = support::config(dir.path()).with_max_retries(2);
    let job = DownloadJob::new(support::SERIES_URL, DownloadMode::WholeSeries, config);
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Failed);
    assert_eq!(report.totals.succeeded, 5);
    assert_eq!(report.totals.failed, 1);
    assert_eq!(report.failed_units.len(), 1);

    let failed = &report.failed_units[0];
    assert_eq!(failed.id, UnitId::new(1, 2));
    assert_eq!(failed.url, broken);
    assert_eq!(failed.kind, ErrorKind::TransientNetwork);
    assert_eq!(failed.attempts, 3);
    assert_eq!(transport.calls(&broken), 3);

    assert_eq!(report.chapters[0].failed, 1);
    assert!(!report.chapters[0].is_complete());
    assert!(report.chapters[1].is_complete());
    assert_eq!(support::page_files(&report.series_dir).len(), 5);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_retries() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2]));
    let transport = MockTransport::new();
    let flaky = support::page_url(1, 1);
    transport.set_behavior(&flaky, Behavior::TransientThenOk(2));

    let config = support::config(dir.path()).with_max_retries(3);
    let job = DownloadJob::new(support::SERIES_URL, DownloadMode::WholeSeries, config);
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Completed);
    assert_eq!(transport.calls(&flaky), 3);
}

#[tokio::test]
async fn test_non_retryable_errors_fail_after_one_attempt() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3]));
    let transport = MockTransport::new();
    transport.set_behavior(
        support::page_url(1, 1),
        Behavior::Fail(ConnectorError::Extraction("image url expired".into())),
    );
    transport.set_behavior(
        support::page_url(1, 2),
        Behavior::Fail(ConnectorError::Rejected {
            status: 404,
            url: support::page_url(1, 2),
        }),
    );
    transport.set_behavior(support::page_url(1, 3), Behavior::Html);

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Failed);
    let kinds: Vec<_> = report.failed_units.iter().map(|u| u.kind).collect();
    assert_eq!(
        kinds,
        vec![ErrorKind::Extraction, ErrorKind::Rejected, ErrorKind::Validation]
    );
    assert!(report.failed_units.iter().all(|u| u.attempts == 1));
    assert_eq!(transport.total_calls(), 3);
    assert!(support::page_files(&report.series_dir).is_empty());
}

#[tokio::test]
async fn test_report_order_independent_of_completion_order() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![4, 4, 4]));
    let transport = MockTransport::new();
    for chapter in 1..=3 {
        for page in 1..=4 {
            let delay = ((chapter * 7 + page * 13) % 5) as u64 * 10;
            transport.set_delay(support::page_url(chapter, page), Duration::from_millis(delay));
        }
    }
    for (chapter, page) in [(3, 4), (2, 1), (1, 3)] {
        transport.set_behavior(
            support::page_url(chapter, page),
            Behavior::Fail(ConnectorError::Rejected {
                status: 410,
                url: support::page_url(chapter, page),
            }),
        );
    }

    let config = support::config(dir.path()).with_concurrency(4);
    let job = DownloadJob::new(support::SERIES_URL, DownloadMode::WholeSeries, config);
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    let failed: Vec<_> = report.failed_units.iter().map(|u| u.id).collect();
    assert_eq!(
        failed,
        vec![UnitId::new(1, 3), UnitId::new(2, 1), UnitId::new(3, 4)]
    );
    let indices: Vec<_> = report.chapters.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(report.totals.succeeded + report.totals.failed, report.totals.total);
    assert_eq!(report.totals.succeeded, 9);
}

#[tokio::test]
async fn test_single_chapter_mode_downloads_only_target() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2, 3, 2]));
    let transport = MockTransport::new();

    let job = DownloadJob::new(
        support::chapter_url(2),
        DownloadMode::SingleChapter,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Completed);
    assert_eq!(report.chapters.len(), 1);
    assert_eq!(report.chapters[0].index, 2);
    assert_eq!(report.totals.total, 3);
    assert_eq!(connector.list_calls(), 1);
    assert_eq!(
        support::page_files(&report.series_dir),
        vec![
            "002 - Chapter 2/001.jpg",
            "002 - Chapter 2/002.jpg",
            "002 - Chapter 2/003.jpg",
        ]
    );
}

#[tokio::test]
async fn test_single_chapter_mode_requires_matching_chapter() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![1, 1]));
    let transport = MockTransport::new();

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::SingleChapter,
        support::config(dir.path()),
    );
    let result = executor(&connector, &transport).execute(job).await;
    assert!(matches!(result, Err(DownloadError::ChapterNotFound(_))));
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_pages_listed_lazily_only_when_missing() {
    let dir = TempDir::new().unwrap();
    let lazy = Arc::new(MockConnector::new(vec![2, 2, 2]));
    let transport = MockTransport::new();
    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    executor(&lazy, &transport).execute(job).await.unwrap();
    assert_eq!(lazy.list_calls(), 3);

    let dir = TempDir::new().unwrap();
    let eager = Arc::new(MockConnector::new(vec![2, 2, 2]).eager());
    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&eager, &transport).execute(job).await.unwrap();
    assert_eq!(eager.list_calls(), 0);
    assert_eq!(report.totals.succeeded, 6);
}

#[tokio::test]
async fn test_failed_page_listing_is_a_chapter_failure() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(
        MockConnector::new(vec![2, 2])
            .fail_listing(2, ConnectorError::Extraction("reader markup changed".into())),
    );
    let transport = MockTransport::new();

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Failed);
    assert_eq!(report.totals.total, 2);
    assert_eq!(report.totals.succeeded, 2);
    assert!(report.chapters[0].is_complete());
    let failed: Vec<_> = report.failed_chapters().map(|c| c.index).collect();
    assert_eq!(failed, vec![2]);
    assert!(report.chapters[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("reader markup changed")));
}

#[tokio::test]
async fn test_unsupported_site_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![1]));
    let transport = MockTransport::new();

    let job = DownloadJob::new(
        "https://unknown.example/series/x",
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let result = executor(&connector, &transport).execute(job).await;

    assert!(matches!(result, Err(DownloadError::UnsupportedSite(host)) if host == "unknown.example"));
    assert_eq!(connector.describe_calls(), 0);
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![1]));
    let transport = MockTransport::new();

    let config = support::config(dir.path()).with_concurrency(0);
    let job = DownloadJob::new(support::SERIES_URL, DownloadMode::WholeSeries, config);
    let result = executor(&connector, &transport).execute(job).await;
    assert!(matches!(result, Err(DownloadError::Configuration(_))));
}

#[tokio::test]
async fn test_no_partial_files_left_behind() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3, 2]));
    let transport = MockTransport::new();
    transport.set_behavior(support::page_url(2, 1), Behavior::Html);

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert!(support::files_under(&report.series_dir)
        .iter()
        .all(|f| !f.ends_with(".part")));
}

#[tokio::test]
async fn test_struct_literal_series_is_renumbered() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3, 3]).literal());
    let transport = MockTransport::new();

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Completed);
    assert_eq!(report.totals.succeeded, 6);
    let indices: Vec<usize> = report.chapters.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![1, 2]);
    let files = support::page_files(&report.series_dir);
    assert_eq!(files.len(), 6);
    assert!(files[0].starts_with("001 - Chapter 1/"));
    assert!(files[5].starts_with("002 - Chapter 2/"));
}

#[tokio::test]
async fn test_forbidden_page_is_retried() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2]));
    let transport = MockTransport::new();
    let throttled = support::page_url(1, 1);
    let missing = support::page_url(1, 2);
    transport.set_behavior(&throttled, Behavior::StatusThenOk(403, 1));
    transport.set_behavior(&missing, Behavior::StatusThenOk(404, u32::MAX));

    let job = DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    );
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(transport.calls(&throttled), 2);
    assert_eq!(transport.calls(&missing), 1);
    assert_eq!(report.totals.succeeded, 1);
    assert_eq!(report.failed_units.len(), 1);
    assert_eq!(report.failed_units[0].url, missing);
    assert_eq!(report.failed_units[0].kind, ErrorKind::Rejected);
}

#[tokio::test]
async fn test_user_agent_reaches_every_page_request() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2, 1]));
    let transport = MockTransport::new();

    let config = support::config(dir.path()).with_user_agent(Some("ComicBot/2.0".into()));
    let job = DownloadJob::new(support::SERIES_URL, DownloadMode::WholeSeries, config);
    let report = executor(&connector, &transport).execute(job).await.unwrap();

    assert_eq!(report.state, JobStatus::Completed);
    let agents = transport.user_agents();
    assert_eq!(agents.len(), 3);
    assert!(agents
        .iter()
        .all(|agent| agent.as_deref() == Some("ComicBot/2.0")));
}
