//! Output layout and storage writer

use std::fs::File;
use std::path::Path;
use tracing::warn;

pub mod path;
pub mod writer;

pub use path::{resolve_extension, sanitize_component, OutputPathBuilder};
pub use writer::{looks_like_html, StagedWrite, StorageWriter};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("failed to {action} {path}: {message}")]
    Io {
        /// Operation that failed
        action: &'static str,
        /// Affected path
        path: String,
        /// OS error text
        message: String,
    },

    /// Blocking write task panicked or was cancelled
    #[error("storage task failed: {0}")]
    TaskFailed(String),
}

impl StorageError {
    pub(crate) fn io(path: &Path, action: &'static str, error: std::io::Error) -> Self {
        StorageError::Io {
            action,
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }
}

/// Flush directory metadata so a completed rename survives a crash
///
/// Failure is logged and reported as `false`; the data itself is already
/// synced at this point.
pub(crate) fn sync_directory(dir: &Path) -> bool {
    match File::open(dir).and_then(|handle| handle.sync_all()) {
        Ok(()) => true,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to sync directory");
            false
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
