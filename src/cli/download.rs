//! Download command implementation

use crate::downloader::{DownloadError, DownloadExecutor, DownloadJob, ErrorKind, FailedUnit, RunReport};
use crate::registry::ConnectorRegistry;
use crate::shutdown::SharedShutdown;
use crate::DownloadMode;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{error, info};

use super::{Cli, CliError, OutputFormat};

/// Download command arguments
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Series or chapter URL
    pub url: String,

    /// What to download: whole-series or single-chapter
    #[arg(long, default_value = "whole-series")]
    pub mode: DownloadMode,
}

impl DownloadArgs {
    /// Execute the download; `Ok(false)` when the job did not complete
    pub async fn execute(
        &self,
        cli: &Cli,
        registry: Arc<ConnectorRegistry>,
        shutdown: SharedShutdown,
    ) -> Result<bool, CliError> {
        let config = cli.download_config();
        config.validate().map_err(CliError::InvalidArgument)?;

        let job = DownloadJob::new(self.url.clone(), self.mode, config);
        let progress = create_progress_bar(cli.output_format);
        let executor = DownloadExecutor::new(registry)
            .with_shutdown(shutdown)
            .with_progress_bar(progress.clone());

        info!("Starting {} download: {}", self.mode, self.url);
        let result = executor.execute(job).await;
        progress.finish_and_clear();

        match cli.output_format {
            OutputFormat::Json => output_json(&self.url, &result),
            OutputFormat::Human => output_human(&self.url, &result),
        }

        let report = result?;
        Ok(report.is_success())
    }
}

/// Output result as JSON
fn output_json(url: &str, result: &Result<RunReport, DownloadError>) {
    let output = match result {
        Ok(report) => serde_json::to_value(report).unwrap_or_else(|e| {
            serde_json::json!({ "target_url": url, "error": e.to_string() })
        }),
        Err(e) => serde_json::json!({
            "target_url": url,
            "state": "failed",
            "error": e.to_string(),
        }),
    };
    println!("{output}");
}

/// Output result in human-readable format
fn output_human(url: &str, result: &Result<RunReport, DownloadError>) {
    match result {
        Ok(report) => {
            if report.is_success() {
                println!("\nDownload completed successfully!");
            } else {
                println!("\nDownload finished: {}", report.state);
            }
            println!("Series: {} ({})", report.series_title, report.connector);
            println!("Output: {}", report.series_dir.display());
            println!(
                "Pages: {}/{} written, {} reused, {} failed, {} not attempted",
                report.totals.succeeded,
                report.totals.total,
                report.totals.skipped,
                report.totals.failed,
                report.not_attempted
            );

            for chapter in &report.chapters {
                if chapter.is_complete() {
                    continue;
                }
                println!(
                    "  Chapter {} \"{}\": {}/{} pages{}",
                    chapter.index,
                    chapter.title,
                    chapter.succeeded,
                    chapter.total,
                    chapter
                        .error
                        .as_deref()
                        .map(|e| format!(" ({e})"))
                        .unwrap_or_default()
                );
            }
            for unit in &report.failed_units {
                println!(
                    "  [{}] {} after {} attempt(s): {}",
                    unit.kind, unit.id, unit.attempts, unit.url
                );
            }
            for hint in failure_hints(&report.failed_units) {
                println!("Hint: {hint}");
            }
            if let Some(reason) = &report.aborted {
                println!("Stopped early: {reason}");
            }
            println!("Elapsed: {:.1}s", report.elapsed_secs);
        }
        Err(e) => {
            eprintln!("\nDownload of {url} failed!");
            eprintln!("Error: {e}");
            error!("Download failed: {}", e);
        }
    }
}

/// One suggestion per distinct failure kind, in order of first appearance
fn failure_hints(failed: &[FailedUnit]) -> Vec<&'static str> {
    let mut seen: Vec<ErrorKind> = Vec::new();
    for unit in failed {
        if !seen.contains(&unit.kind) {
            seen.push(unit.kind);
        }
    }
    seen.iter().map(ErrorKind::suggestion).collect()
}

/// Create progress bar with style; hidden for JSON output
fn create_progress_bar(format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages ({percent}%) {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
