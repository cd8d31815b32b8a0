//! CLI error types and conversions

use crate::downloader::DownloadError;
use crate::metrics::MetricsError;
use crate::registry::RegistryError;
use crate::resume::ManifestError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Manifest error
    #[error("manifest error: {0}")]
    ManifestError(#[from] ManifestError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
