//! CLI command implementations
//!
//! The binary registers no site connectors of its own; a distribution that
//! bundles connectors builds its [`ConnectorRegistry`] and hands it to
//! [`run`].

pub mod download;
pub mod error;
pub mod sources;
pub mod verify;

pub use download::DownloadArgs;
pub use error::CliError;
pub use sources::SourcesCommand;
pub use verify::VerifyCommand;

use crate::downloader::config::{DownloadConfig, MAX_CONCURRENCY};
use crate::registry::ConnectorRegistry;
use crate::shutdown::SharedShutdown;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Comic Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "comic-downloader")]
#[command(about = "Download comic and manga chapters from supported sites", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Root directory for downloaded series (default: "downloads")
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Pages fetched in parallel (default: 3, max: 32)
    ///
    /// Requests to one site are still spaced by --delay-ms, so raising this
    /// mostly helps when page responses are slow.
    #[arg(long, global = true, default_value = "3", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Minimum delay between two requests to the same site, in milliseconds
    #[arg(long, global = true, default_value = "1000")]
    pub delay_ms: u64,

    /// Retries after the first attempt for transient failures (default: 3, range: 0-20)
    ///
    /// A page is requested at most retries + 1 times.
    #[arg(long, global = true, default_value = "3", value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,

    /// Cancel the job after this many seconds
    #[arg(long, global = true)]
    pub time_budget_secs: Option<u64>,

    /// Download pages again even if they are already on disk
    #[arg(long, global = true, default_value_t = false)]
    pub overwrite: bool,

    /// Show the browser window of browser-backed transports
    #[arg(long, global = true, default_value_t = false)]
    pub visible: bool,

    /// User agent sent with every request
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Job configuration from the global flags
    pub fn download_config(&self) -> DownloadConfig {
        let mut config = DownloadConfig::default()
            .with_concurrency(self.concurrency)
            .with_request_delay(Duration::from_millis(self.delay_ms))
            .with_max_retries(self.max_retries)
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_overwrite(self.overwrite)
            .with_headless(!self.visible)
            .with_user_agent(self.user_agent.clone())
            .with_time_budget(self.time_budget_secs.map(Duration::from_secs));
        if let Some(dir) = &self.output_dir {
            config = config.with_output_root(dir.clone());
        }
        config
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a series or a single chapter
    Download(DownloadArgs),

    /// List registered connectors and the domains they serve
    Sources(SourcesCommand),

    /// Check a downloaded series directory against its run manifest
    Verify(VerifyCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Run a parsed command line against `registry`
///
/// Returns `Ok(false)` when the command ran but did not succeed, e.g. a
/// download that finished with failed pages.
pub async fn run(
    cli: &Cli,
    registry: Arc<ConnectorRegistry>,
    shutdown: SharedShutdown,
) -> Result<bool, CliError> {
    if let Some(addr) = cli.metrics_addr {
        crate::metrics::init_metrics(addr)?;
    }

    match &cli.command {
        Commands::Download(args) => args.execute(cli, registry, shutdown).await,
        Commands::Sources(cmd) => cmd.execute(cli, &registry).map(|_| true),
        Commands::Verify(cmd) => cmd.execute(cli),
    }
}
