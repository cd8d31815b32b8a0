//! Download executor
//!
//! Drives one job through `Resolving → Expanding → Running → Finalizing` and
//! into `Completed`, `Failed` or `Cancelled`. Failures before any page is
//! fetched are returned as [`DownloadError`]; once the job reaches `Running`
//! a [`RunReport`] is always produced.

use indicatif::ProgressBar;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::connector::{ConnectorError, ConnectorHandle, ConnectorResult};
use crate::downloader::config::DownloadConfig;
use crate::downloader::job::{DownloadJob, JobProgress, JobStatus};
use crate::downloader::pool::{WorkerContext, WorkerPool};
use crate::downloader::progress::{ProgressState, ProgressTracker};
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::report::{failed_units, ChapterReport, ResultAccumulator, RunReport};
use crate::downloader::unit::{FetchResult, FetchUnit, UnitId, UnitOutcome};
use crate::downloader::DownloadError;
use crate::fetcher::{HttpTransport, Session, SessionOptions, Transport};
use crate::metrics;
use crate::output::{OutputPathBuilder, StorageWriter};
use crate::registry::ConnectorRegistry;
use crate::resume::{ManifestChapter, ManifestPage, PageStatus, RunManifest};
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator, ShutdownReason};
use crate::{Chapter, DownloadMode, Series};

/// A chapter after expansion
#[derive(Debug)]
struct PlannedChapter {
    index: usize,
    title: String,
    url: String,
    dir_name: String,
    directory: PathBuf,
    units: Vec<FetchUnit>,
    error: Option<String>,
}

/// Outcome of a connector call made during expansion
enum CallError {
    Cancelled,
    Failed(ConnectorError),
}

/// Per-job collaborators shared by the expansion and run phases
struct JobScope<'a> {
    connector: &'a ConnectorHandle,
    session: &'a Session,
    limiter: &'a RateLimiter,
    config: &'a DownloadConfig,
    shutdown: &'a SharedShutdown,
}

/// Result bookkeeping while pages are running
struct RunTally {
    accumulator: Arc<ResultAccumulator>,
    progress: ProgressState,
    bar: Option<ProgressBar>,
    storage_threshold: u32,
}

impl RunTally {
    /// Record a result; returns an abort reason when storage keeps failing
    fn record(&mut self, result: FetchResult) -> Option<String> {
        let fetched = matches!(
            result.outcome,
            UnitOutcome::Succeeded { reused: false, .. }
        );
        let message = match &result.outcome {
            UnitOutcome::Failed { message, .. } => Some(message.clone()),
            _ => None,
        };

        let snapshot = self.accumulator.record(result);
        if snapshot.counted {
            self.progress.update(fetched);
            if let Some(bar) = &self.bar {
                bar.inc(1);
            }
            if self.progress.should_emit_update() {
                info!("{}", self.progress.format_progress());
                self.progress.mark_emitted();
            }
        }

        (snapshot.consecutive_storage_failures >= self.storage_threshold).then(|| {
            format!(
                "{} consecutive storage failures, last: {}",
                snapshot.consecutive_storage_failures,
                message.unwrap_or_default()
            )
        })
    }
}

/// Download executor orchestrates the complete download workflow
pub struct DownloadExecutor {
    registry: Arc<ConnectorRegistry>,
    transport: Option<Arc<dyn Transport>>,
    limiter: Option<RateLimiter>,
    writer: StorageWriter,
    progress_tracker: ProgressTracker,
    progress_bar: Option<ProgressBar>,
    shutdown: Option<SharedShutdown>,
}

impl DownloadExecutor {
    /// Create an executor resolving connectors from `registry`
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            registry,
            transport: None,
            limiter: None,
            writer: StorageWriter::new(),
            progress_tracker: ProgressTracker::default(),
            progress_bar: None,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Use a specific transport instead of the default HTTP client
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a rate limiter across jobs instead of one per job
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Override progress tracking configuration.
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// Drive an `indicatif` progress bar while pages download
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }

    /// Run a job to completion
    pub async fn execute(&self, mut job: DownloadJob) -> Result<RunReport, DownloadError> {
        let span = tracing::info_span!(
            "execute_job",
            url = %job.target_url,
            mode = %job.mode,
        );

        let outcome = self.execute_inner(&mut job).instrument(span).await;
        match &outcome {
            Ok(report) => metrics::record_job(report.state),
            Err(e) => {
                transition(&mut job, JobStatus::Failed);
                warn!(url = %job.target_url, error = %e, "Download job failed");
                metrics::record_job(JobStatus::Failed);
            }
        }
        outcome
    }

    async fn execute_inner(&self, job: &mut DownloadJob) -> Result<RunReport, DownloadError> {
        let started = Instant::now();
        job.validate().map_err(DownloadError::Configuration)?;

        transition(job, JobStatus::Resolving);
        let connector = self.registry.resolve(&job.target_url)?;
        info!(connector = connector.name(), "Resolved connector");

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(
                HttpTransport::new(job.config.request_timeout)
                    .map_err(DownloadError::Session)?
                    .with_max_body_bytes(job.config.max_page_bytes),
            ),
        };
        let options = SessionOptions {
            headless: job.config.headless,
            user_agent: job.config.user_agent.clone(),
        };
        let session = Session::open(transport, options)
            .await
            .map_err(DownloadError::Session)?;

        let job_shutdown = ShutdownCoordinator::shared();
        let watcher = self.spawn_cancellation_watcher(&job_shutdown, job);
        let limiter = self
            .limiter
            .clone()
            .unwrap_or_else(|| RateLimiter::new(job.config.request_delay));
        let config = job.config.clone();

        let scope = JobScope {
            connector: &connector,
            session: &session,
            limiter: &limiter,
            config: &config,
            shutdown: &job_shutdown,
        };
        let outcome = self.run(job, &scope, started).await;

        watcher.abort();
        session.release().await;
        outcome
    }

    /// Cancel the job when the external handle fires or the time budget ends
    fn spawn_cancellation_watcher(
        &self,
        job_shutdown: &SharedShutdown,
        job: &DownloadJob,
    ) -> JoinHandle<()> {
        let external = self.shutdown.clone();
        let budget = job.config.time_budget;
        let job_shutdown = job_shutdown.clone();

        if let Some(handle) = external.as_ref().filter(|h| h.is_shutdown_requested()) {
            job_shutdown
                .request_shutdown_with(handle.reason().unwrap_or(ShutdownReason::UserInterrupt));
        }

        tokio::spawn(async move {
            let external = async {
                match &external {
                    Some(handle) => {
                        handle.wait_for_shutdown().await;
                        handle.reason().unwrap_or(ShutdownReason::UserInterrupt)
                    }
                    None => std::future::pending().await,
                }
            };
            let budget = async {
                match budget {
                    Some(budget) => {
                        tokio::time::sleep(budget).await;
                        ShutdownReason::TimeBudget
                    }
                    None => std::future::pending().await,
                }
            };

            let reason = tokio::select! {
                reason = external => reason,
                reason = budget => reason,
            };
            info!(reason = %reason, "Cancelling download job");
            job_shutdown.request_shutdown_with(reason);
        })
    }

    async fn run(
        &self,
        job: &mut DownloadJob,
        scope: &JobScope<'_>,
        started: Instant,
    ) -> Result<RunReport, DownloadError> {
        transition(job, JobStatus::Expanding);

        let target = job.target_url.clone();
        let (connector, session) = (scope.connector, scope.session);
        let mut series = match self
            .call_connector(scope, "describe", || connector.describe(&target, session))
            .await
        {
            Ok(series) => series,
            Err(CallError::Cancelled) => {
                transition(job, JobStatus::Cancelled);
                return Ok(self.cancelled_before_expansion(job, scope, started));
            }
            Err(CallError::Failed(source)) => {
                return Err(DownloadError::Describe {
                    url: target,
                    source,
                })
            }
        };
        series.renumber();
        series.validate().map_err(|reason| DownloadError::Describe {
            url: target.clone(),
            source: ConnectorError::Extraction(reason),
        })?;

        let selected = select_chapters(&series, job.mode, &target)?;
        let paths = OutputPathBuilder::new(scope.config.output_root.clone(), &series.title);
        let series_dir = paths.series_dir();
        info!(
            series = %series.title,
            chapters = selected.len(),
            directory = %series_dir.display(),
            "Series described"
        );

        let (planned, mut cancelled) = self
            .expand(scope, &series, &selected, &paths)
            .await?;

        let previous = RunManifest::load_existing(&series_dir);
        let recorded_sizes = previous
            .as_ref()
            .map(RunManifest::size_index)
            .unwrap_or_default();

        let total: u64 = planned.iter().map(|c| c.units.len() as u64).sum();
        job.progress = JobProgress::with_total(total);
        let mut tally = RunTally {
            accumulator: Arc::new(ResultAccumulator::new(total)),
            progress: self.progress_tracker.create_state(total),
            bar: self.progress_bar.clone(),
            storage_threshold: scope.config.storage_failure_threshold,
        };
        if let Some(bar) = &tally.bar {
            bar.set_length(total);
            bar.set_position(0);
        }

        let mut aborted = None;
        if !cancelled {
            transition(job, JobStatus::Running);
            let pending = self.skip_existing(scope, &planned, &recorded_sizes, &mut tally);
            info!(
                total_pages = total,
                reused = tally.accumulator.progress().skipped,
                to_fetch = pending.len(),
                "Starting page downloads"
            );
            let (was_cancelled, abort_reason) = self.run_units(scope, pending, &mut tally).await;
            cancelled = was_cancelled;
            aborted = abort_reason;
        }

        if cancelled {
            aborted = scope.shutdown.reason().map(|r| r.to_string());
        } else {
            transition(job, JobStatus::Finalizing);
        }

        job.progress = tally.accumulator.progress();
        let report = self.finalize(
            job,
            scope,
            FinalizeInput {
                series: &series,
                series_dir,
                planned: &planned,
                accumulator: &tally.accumulator,
                previous: previous.as_ref(),
                cancelled,
                aborted,
                started,
            },
        );
        transition(job, report.state);

        if let Some(bar) = &tally.bar {
            bar.finish_and_clear();
        }
        Ok(report)
    }

    /// Call a connector with rate limiting, timeout and transient retries
    async fn call_connector<T, F, Fut>(
        &self,
        scope: &JobScope<'_>,
        operation: &str,
        mut call: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ConnectorResult<T>>,
    {
        let max_attempts = scope.config.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = async {
                scope.limiter.acquire(scope.connector.key()).await;
                match tokio::time::timeout(scope.config.connector_timeout, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectorError::Timeout(format!(
                        "{operation} did not finish within {:?}",
                        scope.config.connector_timeout
                    ))),
                }
            };

            let result = tokio::select! {
                biased;
                _ = scope.shutdown.wait_for_shutdown() => return Err(CallError::Cancelled),
                result = request => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = scope.config.backoff(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Connector call failed, retrying"
                    );
                    metrics::record_retry(scope.connector.key(), attempt, backoff);
                    tokio::select! {
                        biased;
                        _ = scope.shutdown.wait_for_shutdown() => return Err(CallError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => return Err(CallError::Failed(e)),
            }
        }
    }

    /// List pages where needed and turn chapters into units
    async fn expand(
        &self,
        scope: &JobScope<'_>,
        series: &Series,
        selected: &[&Chapter],
        paths: &OutputPathBuilder,
    ) -> Result<(Vec<PlannedChapter>, bool), DownloadError> {
        let chapter_count = series.chapters.len();
        let mut planned = Vec::with_capacity(selected.len());
        let mut destinations = HashSet::new();
        let mut cancelled = false;
        let (connector, session) = (scope.connector, scope.session);

        for &chapter in selected {
            let dir_name =
                OutputPathBuilder::chapter_dir_name(chapter.index, chapter_count, &chapter.title);
            let mut plan = PlannedChapter {
                index: chapter.index,
                title: chapter.title.clone(),
                url: chapter.url.clone(),
                directory: paths.series_dir().join(&dir_name),
                dir_name,
                units: Vec::new(),
                error: None,
            };

            if cancelled {
                plan.error = Some("cancelled before pages were listed".to_string());
                planned.push(plan);
                continue;
            }

            let pages = match &chapter.pages {
                Some(pages) => Ok(pages.clone()),
                None => {
                    debug!(chapter = chapter.index, "Listing pages");
                    self.call_connector(scope, "list_pages", || {
                        connector.list_pages(chapter, session)
                    })
                    .await
                }
            };

            match pages {
                Ok(pages) if pages.is_empty() => {
                    warn!(chapter = chapter.index, "Chapter has no pages");
                    plan.error =
                        Some(ConnectorError::Extraction("chapter has no pages".into()).to_string());
                }
                Ok(pages) => {
                    let page_count = pages.len();
                    for (i, page_url) in pages.iter().enumerate() {
                        let page = i + 1;
                        let destination = paths.page_destination(
                            chapter.index,
                            chapter_count,
                            &chapter.title,
                            page,
                            page_count,
                        );
                        let claimed = (destination.directory.clone(), destination.stem.clone());
                        if !destinations.insert(claimed) {
                            return Err(DownloadError::Expansion(format!(
                                "page {page} of chapter {} maps to an existing destination",
                                chapter.index
                            )));
                        }
                        let request = connector.page_request(chapter, page_url);
                        plan.units.push(FetchUnit::new(
                            UnitId::new(chapter.index, page),
                            request,
                            destination,
                        ));
                    }
                }
                Err(CallError::Cancelled) => {
                    cancelled = true;
                    plan.error = Some("cancelled before pages were listed".to_string());
                }
                Err(CallError::Failed(e)) => {
                    warn!(chapter = chapter.index, error = %e, "Failed to list pages");
                    plan.error = Some(e.to_string());
                }
            }
            planned.push(plan);
        }

        Ok((planned, cancelled))
    }

    /// Sweep partial files, record pages already on disk and return the rest
    /// in series order
    fn skip_existing(
        &self,
        scope: &JobScope<'_>,
        planned: &[PlannedChapter],
        recorded_sizes: &HashMap<String, u64>,
        tally: &mut RunTally,
    ) -> VecDeque<FetchUnit> {
        let mut pending = VecDeque::new();

        for chapter in planned {
            let swept = self.writer.sweep_partials(&chapter.directory);
            if swept > 0 {
                info!(chapter = chapter.index, swept, "Removed partial pages from an earlier run");
            }
            for unit in &chapter.units {
                if !scope.config.overwrite {
                    let key = format!("{}/{}", chapter.dir_name, unit.destination.stem);
                    let expected = recorded_sizes.get(&key).copied();
                    if let Some((path, bytes)) =
                        self.writer.find_existing(&unit.destination, expected)
                    {
                        debug!(unit = %unit.id, path = %path.display(), "Reusing existing page");
                        metrics::record_page_skipped(scope.connector.key());
                        tally.record(FetchResult {
                            id: unit.id,
                            source_url: unit.source_url().to_string(),
                            outcome: UnitOutcome::Succeeded {
                                path,
                                bytes,
                                reused: true,
                            },
                            attempts: 0,
                        });
                        continue;
                    }
                }
                pending.push_back(unit.clone());
            }
        }
        pending
    }

    /// Feed units to the pool; returns (cancelled, abort reason)
    async fn run_units(
        &self,
        scope: &JobScope<'_>,
        mut pending: VecDeque<FetchUnit>,
        tally: &mut RunTally,
    ) -> (bool, Option<String>) {
        let ctx = Arc::new(WorkerContext {
            connector: scope.connector.clone(),
            session: scope.session.clone(),
            limiter: scope.limiter.clone(),
            writer: self.writer.clone(),
            config: scope.config.clone(),
            shutdown: scope.shutdown.clone(),
        });
        let mut pool = WorkerPool::new(ctx, scope.config.concurrency);
        let slots = pool.slots();
        let mut cancelled = false;
        let mut aborted = None;

        while !pending.is_empty() || pool.in_flight() > 0 {
            tokio::select! {
                biased;
                _ = scope.shutdown.wait_for_shutdown() => {
                    cancelled = true;
                    break;
                }
                Some(result) = pool.next_result(), if pool.in_flight() > 0 => {
                    if let Some(reason) = tally.record(result) {
                        warn!(reason = %reason, "Aborting job");
                        aborted = Some(reason);
                        break;
                    }
                }
                permit = slots.clone().acquire_owned(), if !pending.is_empty() => {
                    match (permit, pending.pop_front()) {
                        (Ok(permit), Some(unit)) => pool.spawn(unit, permit),
                        _ => break,
                    }
                }
            }
        }

        if cancelled || aborted.is_some() {
            if aborted.is_some() {
                // Stop retries and backoffs of the units still running.
                scope
                    .shutdown
                    .request_shutdown_with(ShutdownReason::Requested);
            }
            info!(
                in_flight = pool.in_flight(),
                not_submitted = pending.len(),
                "Draining worker pool"
            );
            for result in pool.shutdown(scope.config.cancel_grace).await {
                tally.record(result);
            }
        }

        (cancelled, aborted)
    }

    fn cancelled_before_expansion(
        &self,
        job: &DownloadJob,
        scope: &JobScope<'_>,
        started: Instant,
    ) -> RunReport {
        RunReport {
            target_url: job.target_url.clone(),
            mode: job.mode,
            connector: scope.connector.name().to_string(),
            series_title: String::new(),
            series_dir: scope.config.output_root.clone(),
            state: JobStatus::Cancelled,
            chapters: Vec::new(),
            failed_units: Vec::new(),
            totals: JobProgress::default(),
            not_attempted: 0,
            aborted: scope.shutdown.reason().map(|r| r.to_string()),
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Verify chapters, write the manifest and build the report
    fn finalize(
        &self,
        job: &DownloadJob,
        scope: &JobScope<'_>,
        input: FinalizeInput<'_>,
    ) -> RunReport {
        let results = input.accumulator.results();
        let totals = input.accumulator.progress();

        let chapters: Vec<ChapterReport> = input
            .planned
            .iter()
            .map(|plan| chapter_report(plan, &results))
            .collect();

        let state = if input.cancelled {
            JobStatus::Cancelled
        } else if input.aborted.is_none()
            && totals.failed == 0
            && totals.succeeded == totals.total
            && chapters.iter().all(ChapterReport::is_complete)
        {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        let mut manifest = RunManifest::new(&job.target_url, &input.series.title, job.mode);
        manifest.state = state;
        manifest.chapters = merge_manifest_chapters(
            input.previous,
            input.planned.iter().map(|plan| manifest_chapter(plan, &results)),
        );
        if let Some(previous) = input.previous {
            manifest.inherit_created_at(previous);
        }
        if input.series_dir.is_dir() {
            let path = RunManifest::path_for(&input.series_dir);
            if let Err(e) = manifest.save(&path) {
                warn!(path = %path.display(), error = %e, "Failed to save run manifest");
            }
        }

        let report = RunReport {
            target_url: job.target_url.clone(),
            mode: job.mode,
            connector: scope.connector.name().to_string(),
            series_title: input.series.title.clone(),
            series_dir: input.series_dir,
            state,
            chapters,
            failed_units: failed_units(&results),
            totals,
            not_attempted: totals.remaining(),
            aborted: input.aborted,
            elapsed_secs: input.started.elapsed().as_secs_f64(),
        };

        info!(
            state = %report.state,
            succeeded = totals.succeeded,
            failed = totals.failed,
            skipped = totals.skipped,
            not_attempted = report.not_attempted,
            failed_chapters = report.failed_chapters().count(),
            elapsed_secs = report.elapsed_secs,
            "Download job finished"
        );
        report
    }
}

struct FinalizeInput<'a> {
    series: &'a Series,
    series_dir: PathBuf,
    planned: &'a [PlannedChapter],
    accumulator: &'a ResultAccumulator,
    previous: Option<&'a RunManifest>,
    cancelled: bool,
    aborted: Option<String>,
    started: Instant,
}

fn transition(job: &mut DownloadJob, status: JobStatus) {
    debug!(from = %job.status, to = %status, "Job state transition");
    job.status = status;
}

/// Chapters a job covers
fn select_chapters<'a>(
    series: &'a Series,
    mode: DownloadMode,
    target: &str,
) -> Result<Vec<&'a Chapter>, DownloadError> {
    match mode {
        DownloadMode::WholeSeries => Ok(series.chapters.iter().collect()),
        DownloadMode::SingleChapter => series
            .chapter_by_url(target)
            .or_else(|| match series.chapters.as_slice() {
                [only] => Some(only),
                _ => None,
            })
            .map(|chapter| vec![chapter])
            .ok_or_else(|| DownloadError::ChapterNotFound(target.to_string())),
    }
}

fn chapter_report(
    plan: &PlannedChapter,
    results: &std::collections::BTreeMap<UnitId, FetchResult>,
) -> ChapterReport {
    let mut report = ChapterReport {
        index: plan.index,
        title: plan.title.clone(),
        url: plan.url.clone(),
        directory: Some(plan.directory.clone()),
        total: plan.units.len() as u64,
        succeeded: 0,
        failed: 0,
        skipped: 0,
        not_attempted: 0,
        missing: 0,
        error: plan.error.clone(),
    };

    for unit in &plan.units {
        match results.get(&unit.id).map(|r| &r.outcome) {
            Some(UnitOutcome::Succeeded {
                path,
                bytes,
                reused,
            }) => {
                report.succeeded += 1;
                if *reused {
                    report.skipped += 1;
                }
                let intact = std::fs::metadata(path)
                    .map(|m| m.is_file() && m.len() == *bytes)
                    .unwrap_or(false);
                if !intact {
                    warn!(unit = %unit.id, path = %path.display(), "Page missing after download");
                    report.missing += 1;
                }
            }
            Some(UnitOutcome::Failed { .. }) => report.failed += 1,
            Some(UnitOutcome::Interrupted) | None => report.not_attempted += 1,
        }
    }
    report
}

fn manifest_chapter(
    plan: &PlannedChapter,
    results: &std::collections::BTreeMap<UnitId, FetchResult>,
) -> ManifestChapter {
    let pages = plan
        .units
        .iter()
        .map(|unit| {
            let mut page = ManifestPage {
                page: unit.id.page,
                url: unit.source_url().to_string(),
                status: PageStatus::NotAttempted,
                path: None,
                bytes: None,
                error: None,
            };
            match results.get(&unit.id).map(|r| &r.outcome) {
                Some(UnitOutcome::Succeeded { path, bytes, .. }) => {
                    page.status = PageStatus::Done;
                    page.path = path
                        .file_name()
                        .map(|name| format!("{}/{}", plan.dir_name, name.to_string_lossy()));
                    page.bytes = Some(*bytes);
                }
                Some(UnitOutcome::Failed { kind, .. }) => {
                    page.status = PageStatus::Failed;
                    page.error = Some(*kind);
                }
                Some(UnitOutcome::Interrupted) | None => {}
            }
            page
        })
        .collect();

    ManifestChapter {
        index: plan.index,
        title: plan.title.clone(),
        url: plan.url.clone(),
        directory: plan.dir_name.clone(),
        error: plan.error.clone(),
        pages,
    }
}

/// Chapters of this run replace their earlier entries; others are kept
fn merge_manifest_chapters(
    previous: Option<&RunManifest>,
    current: impl Iterator<Item = ManifestChapter>,
) -> Vec<ManifestChapter> {
    let current: Vec<ManifestChapter> = current.collect();
    let covered: HashSet<&str> = current.iter().map(|c| c.directory.as_str()).collect();

    let mut merged: Vec<ManifestChapter> = previous
        .map(|m| {
            m.chapters
                .iter()
                .filter(|c| !covered.contains(c.directory.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    merged.extend(current.iter().cloned());
    merged.sort_by_key(|c| c.index);
    merged
}
