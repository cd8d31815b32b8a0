//! Bounded worker pool for page fetches
//!
//! Each unit runs as its own task holding one semaphore permit. A task waits
//! for the site's rate limiter, fetches through the connector with a timeout,
//! validates the payload, writes it through the storage writer and reports a
//! [`FetchResult`]. Transient failures are retried with capped exponential
//! backoff; everything else fails the unit without touching its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::connector::{ConnectorError, ConnectorHandle};
use crate::downloader::config::DownloadConfig;
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::unit::{ErrorKind, FetchResult, FetchUnit, UnitId, UnitOutcome};
use crate::fetcher::retry_formatter::RetryContext;
use crate::fetcher::{FetchedPage, Session};
use crate::metrics;
use crate::output::{looks_like_html, resolve_extension, StorageWriter};
use crate::shutdown::SharedShutdown;

/// Everything a worker needs, shared by all units of a job
pub struct WorkerContext {
    /// Connector serving the job
    pub connector: ConnectorHandle,
    /// Transport session of the job
    pub session: Session,
    /// Per-site request spacing
    pub limiter: RateLimiter,
    /// Page writer
    pub writer: StorageWriter,
    /// Job configuration
    pub config: DownloadConfig,
    /// Job-level cancellation
    pub shutdown: SharedShutdown,
}

/// Bounded pool of page fetch tasks
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    slots: Arc<Semaphore>,
    tasks: JoinSet<FetchResult>,
    in_flight: HashMap<Id, (UnitId, String)>,
}

impl WorkerPool {
    /// Create a pool running at most `concurrency` units at once
    pub fn new(ctx: Arc<WorkerContext>, concurrency: usize) -> Self {
        Self {
            ctx,
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Units currently running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Slot semaphore; acquire an owned permit to pass to [`WorkerPool::spawn`]
    pub fn slots(&self) -> Arc<Semaphore> {
        self.slots.clone()
    }

    /// Start `unit` on a slot obtained from [`WorkerPool::slots`]
    pub fn spawn(&mut self, unit: FetchUnit, permit: OwnedSemaphorePermit) {
        let ctx = self.ctx.clone();
        let id = unit.id;
        let url = unit.source_url().to_string();

        let handle = self.tasks.spawn(async move {
            let result = run_unit(&ctx, unit).await;
            drop(permit);
            result
        });
        debug!(unit = %id, "Unit started");
        self.in_flight.insert(handle.id(), (id, url));
    }

    /// Next finished unit, `None` when nothing is running
    pub async fn next_result(&mut self) -> Option<FetchResult> {
        let joined = self.tasks.join_next_with_id().await?;
        Some(match joined {
            Ok((task_id, result)) => {
                self.in_flight.remove(&task_id);
                result
            }
            Err(join_error) => {
                let (id, url) = self
                    .in_flight
                    .remove(&join_error.id())
                    .unwrap_or((UnitId::new(0, 0), String::new()));
                if join_error.is_cancelled() {
                    FetchResult {
                        id,
                        source_url: url,
                        outcome: UnitOutcome::Interrupted,
                        attempts: 0,
                    }
                } else {
                    error!(unit = %id, error = %join_error, "Worker task panicked");
                    FetchResult {
                        id,
                        source_url: url,
                        outcome: UnitOutcome::Failed {
                            kind: ErrorKind::TransientNetwork,
                            message: format!("worker task panicked: {join_error}"),
                        },
                        attempts: 0,
                    }
                }
            }
        })
    }

    /// Drain running units for at most `grace`, then abort the rest
    ///
    /// Aborted units come back as [`UnitOutcome::Interrupted`].
    pub async fn shutdown(&mut self, grace: Duration) -> Vec<FetchResult> {
        self.slots.close();
        let mut results = Vec::new();
        let deadline = tokio::time::Instant::now() + grace;

        while self.in_flight() > 0 {
            match tokio::time::timeout_at(deadline, self.next_result()).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => break,
                Err(_) => {
                    info!(
                        remaining = self.in_flight(),
                        "Grace period elapsed, aborting in-flight pages"
                    );
                    self.tasks.abort_all();
                    while let Some(result) = self.next_result().await {
                        results.push(result);
                    }
                    break;
                }
            }
        }
        results
    }
}

fn interrupted(unit: &FetchUnit, attempts: u32) -> FetchResult {
    FetchResult {
        id: unit.id,
        source_url: unit.source_url().to_string(),
        outcome: UnitOutcome::Interrupted,
        attempts,
    }
}

/// Reject payloads that are not page images
pub fn validate_page(page: &FetchedPage, url: &str) -> Result<(), ConnectorError> {
    if page.bytes.is_empty() {
        return Err(ConnectorError::Validation(format!("{url}: empty response body")));
    }
    let html_type = page
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"));
    if html_type || looks_like_html(&page.bytes) {
        return Err(ConnectorError::Validation(format!(
            "{url}: received an HTML page instead of an image"
        )));
    }
    Ok(())
}

/// Fetch, validate and store one unit
async fn run_unit(ctx: &WorkerContext, unit: FetchUnit) -> FetchResult {
    let key = ctx.connector.key();
    let max_attempts = ctx.config.max_attempts();
    let mut attempts = 0;

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.wait_for_shutdown() => return interrupted(&unit, attempts),
            _ = ctx.limiter.acquire(key) => {}
        }
        attempts += 1;

        let fetched = match tokio::time::timeout(
            ctx.config.request_timeout,
            ctx.connector.fetch_page(&unit.request, &ctx.session),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::Timeout(format!(
                "{} did not respond within {:?}",
                unit.source_url(),
                ctx.config.request_timeout
            ))),
        }
        .and_then(|page| validate_page(&page, unit.source_url()).map(|_| page));

        let error = match fetched {
            Ok(page) => return store(ctx, &unit, page, attempts).await,
            Err(error) => error,
        };

        if error.is_retryable() && attempts < max_attempts {
            let backoff = ctx.config.backoff(attempts - 1);
            let retry = RetryContext::new(
                attempts + 1,
                max_attempts,
                backoff,
                unit.id.to_string(),
                error.to_string(),
            );
            warn!(unit = %unit.id, "{}", retry.format_retry());
            metrics::record_retry(key, attempts, backoff);

            tokio::select! {
                biased;
                _ = ctx.shutdown.wait_for_shutdown() => return interrupted(&unit, attempts),
                _ = tokio::time::sleep(backoff) => continue,
            }
        }

        let failure = RetryContext::new(
            attempts,
            max_attempts,
            Duration::ZERO,
            unit.id.to_string(),
            error.to_string(),
        );
        warn!(unit = %unit.id, kind = %error.kind(), "{}", failure.format_failure());
        metrics::record_page_failed(key, error.kind());
        return FetchResult {
            id: unit.id,
            source_url: unit.source_url().to_string(),
            outcome: UnitOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
            attempts,
        };
    }
}

async fn store(ctx: &WorkerContext, unit: &FetchUnit, page: FetchedPage, attempts: u32) -> FetchResult {
    let extension = resolve_extension(page.content_type.as_deref(), &page.bytes, unit.source_url());
    let outcome = match ctx
        .writer
        .write(unit.destination.clone(), extension, page.bytes)
        .await
    {
        Ok((path, bytes)) => {
            debug!(unit = %unit.id, path = %path.display(), bytes, "Page stored");
            metrics::record_page_downloaded(ctx.connector.key(), bytes);
            UnitOutcome::Succeeded {
                path,
                bytes,
                reused: false,
            }
        }
        Err(e) => {
            warn!(unit = %unit.id, error = %e, "Failed to store page");
            metrics::record_page_failed(ctx.connector.key(), ErrorKind::Storage);
            UnitOutcome::Failed {
                kind: ErrorKind::Storage,
                message: e.to_string(),
            }
        }
    };

    FetchResult {
        id: unit.id,
        source_url: unit.source_url().to_string(),
        outcome,
        attempts,
    }
}
