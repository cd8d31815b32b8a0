//! Resume: pages already on disk are not fetched again

use crate::support::{self, Behavior, MockConnector, MockTransport, SERIES_TITLE};
use comic_downloader::downloader::{ChapterReport, DownloadExecutor, DownloadJob, JobStatus};
use comic_downloader::resume::{PageStatus, RunManifest, MANIFEST_FILE_NAME};
use comic_downloader::shutdown::ShutdownCoordinator;
use comic_downloader::DownloadMode;
use std::sync::Arc;
use tempfile::TempDir;

fn executor(connector: &Arc<MockConnector>, transport: &Arc<MockTransport>) -> DownloadExecutor {
    DownloadExecutor::new(support::registry(connector.clone()))
        .with_transport(transport.clone())
        .with_shutdown(ShutdownCoordinator::shared())
}

fn job(dir: &TempDir) -> DownloadJob {
    DownloadJob::new(
        support::SERIES_URL,
        DownloadMode::WholeSeries,
        support::config(dir.path()),
    )
}

fn counts(chapters: &[ChapterReport]) -> Vec<(usize, u64, u64, u64)> {
    chapters
        .iter()
        .map(|c| (c.index, c.total, c.succeeded, c.failed))
        .collect()
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3, 2]));
    let transport = MockTransport::new();

    let first = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    assert_eq!(first.state, JobStatus::Completed);
    assert_eq!(transport.total_calls(), 5);

    let second = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    assert_eq!(second.state, JobStatus::Completed);
    assert_eq!(transport.total_calls(), 5, "no page may be fetched again");
    assert_eq!(second.totals.skipped, 5);
    assert_eq!(second.totals.succeeded, 5);
    assert_eq!(counts(&first.chapters), counts(&second.chapters));
    assert_eq!(
        support::page_files(&first.series_dir),
        support::page_files(&second.series_dir)
    );
}

#[tokio::test]
async fn test_resume_retries_only_missing_pages() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![3]));
    let transport = MockTransport::new();
    let broken = support::page_url(1, 3);
    transport.set_behavior(&broken, Behavior::Html);

    let first = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    assert_eq!(first.state, JobStatus::Failed);
    assert_eq!(first.totals.succeeded, 2);

    transport.set_behavior(&broken, Behavior::TransientThenOk(0));
    let second = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    assert_eq!(second.state, JobStatus::Completed);
    assert_eq!(second.totals.skipped, 2);
    assert_eq!(transport.calls(&support::page_url(1, 1)), 1);
    assert_eq!(transport.calls(&broken), 2);
}

#[tokio::test]
async fn test_truncated_page_is_fetched_again() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2]));
    let transport = MockTransport::new();

    let first = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    let page = first.series_dir.join("001 - Chapter 1/002.jpg");
    std::fs::write(&page, &support::JPEG[..4]).unwrap();

    let second = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    assert_eq!(second.state, JobStatus::Completed);
    assert_eq!(second.totals.skipped, 1);
    assert_eq!(transport.calls(&support::page_url(1, 2)), 2);
    assert_eq!(std::fs::read(&page).unwrap(), support::JPEG);
}

#[tokio::test]
async fn test_overwrite_fetches_everything_again() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2]));
    let transport = MockTransport::new();

    executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    let mut again = job(&dir);
    again.config = again.config.with_overwrite(true);
    let report = executor(&connector, &transport).execute(again).await.unwrap();

    assert_eq!(report.totals.skipped, 0);
    assert_eq!(transport.total_calls(), 4);
}

#[tokio::test]
async fn test_manifest_records_every_page() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2, 1]));
    let transport = MockTransport::new();
    transport.set_behavior(support::page_url(2, 1), Behavior::Html);

    let report = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    let series_dir = dir.path().join(SERIES_TITLE);
    let manifest = RunManifest::load(&series_dir.join(MANIFEST_FILE_NAME)).unwrap();

    assert_eq!(manifest.state, report.state);
    assert_eq!(manifest.series_title, SERIES_TITLE);
    assert_eq!(manifest.chapters.len(), 2);
    let first = &manifest.chapters[0];
    assert_eq!(first.directory, "001 - Chapter 1");
    assert!(first.pages.iter().all(|p| p.status == PageStatus::Done));
    assert_eq!(first.pages[0].path.as_deref(), Some("001 - Chapter 1/001.jpg"));
    assert_eq!(first.pages[0].bytes, Some(support::JPEG.len() as u64));
    assert_eq!(manifest.chapters[1].pages[0].status, PageStatus::Failed);

    let verification = manifest.verify(&series_dir);
    assert_eq!(verification.checked, 2);
    assert_eq!(verification.intact, 2);
    assert_eq!(verification.incomplete, 1);
    assert!(!verification.is_complete());
}

#[tokio::test]
async fn test_single_chapter_run_keeps_other_chapters_in_manifest() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![1, 1]));
    let transport = MockTransport::new();

    executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    let manifest_path = dir.path().join(SERIES_TITLE).join(MANIFEST_FILE_NAME);
    let created_at = RunManifest::load(&manifest_path).unwrap().created_at;

    let single = DownloadJob::new(
        support::chapter_url(2),
        DownloadMode::SingleChapter,
        support::config(dir.path()),
    );
    executor(&connector, &transport).execute(single).await.unwrap();

    let manifest = RunManifest::load(&manifest_path).unwrap();
    assert_eq!(manifest.chapters.len(), 2);
    assert_eq!(manifest.created_at, created_at);
    assert!(manifest.verify(&dir.path().join(SERIES_TITLE)).is_complete());
}

#[tokio::test]
async fn test_orphaned_partial_files_are_swept() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MockConnector::new(vec![2]));
    let transport = MockTransport::new();

    let first = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    let chapter_dir = first.series_dir.join("001 - Chapter 1");
    std::fs::write(chapter_dir.join(".001.k3Xq9a.part"), &support::JPEG[..4]).unwrap();
    std::fs::write(chapter_dir.join(".002.Zt81mB.part"), b"").unwrap();

    let second = executor(&connector, &transport).execute(job(&dir)).await.unwrap();
    assert_eq!(second.state, JobStatus::Completed);
    assert_eq!(second.totals.skipped, 2);
    assert!(support::files_under(&second.series_dir)
        .iter()
        .all(|f| !f.ends_with(".part")));
    assert_eq!(
        support::page_files(&second.series_dir),
        vec!["001 - Chapter 1/001.jpg", "001 - Chapter 1/002.jpg"]
    );
}
