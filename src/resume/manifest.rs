//! Run manifest persistence
//!
//! The manifest records every page of the last run: status, path relative to
//! the series directory and size. It is written atomically through a temp file
//! and guarded by an `fd-lock` lock file so two processes never interleave a
//! save and a load.

use crate::downloader::job::JobStatus;
use crate::downloader::unit::ErrorKind;
use crate::output::sync_directory;
use crate::DownloadMode;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifest file name inside the series directory
pub const MANIFEST_FILE_NAME: &str = ".download-state.json";

/// Current manifest schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed manifest size (10 MB) to prevent memory exhaustion
pub const MAX_MANIFEST_SIZE: u64 = 10 * 1024 * 1024;

/// Manifest errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected version
        expected: String,
        /// Found version
        found: String,
    },

    /// File too large
    #[error("manifest is {size} bytes, exceeding the {max} byte limit")]
    TooLarge {
        /// Actual size
        size: u64,
        /// Limit
        max: u64,
    },
}

/// Final status of a page in the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// On disk
    Done,
    /// Failed in the run
    Failed,
    /// Never attempted (cancelled or aborted)
    NotAttempted,
}

/// One page entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPage {
    /// 1-based page position
    pub page: usize,
    /// Source URL
    pub url: String,
    /// Status in the run
    pub status: PageStatus,
    /// Path relative to the series directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Failure category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// One chapter entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChapter {
    /// 1-based chapter position
    pub index: usize,
    /// Chapter title
    pub title: String,
    /// Chapter URL
    pub url: String,
    /// Directory name inside the series directory
    pub directory: String,
    /// Chapter-level failure (page listing failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pages in reading order
    pub pages: Vec<ManifestPage>,
}

/// Persisted record of the last run for a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    schema_version: String,
    /// URL the job was started with
    pub target_url: String,
    /// Series title
    pub series_title: String,
    /// Download mode
    pub mode: DownloadMode,
    /// Terminal state of the run
    pub state: JobStatus,
    /// Chapters covered by the run
    pub chapters: Vec<ManifestChapter>,
    /// Unix millis of the first run
    pub created_at: i64,
    /// Unix millis of the last save
    pub updated_at: i64,
}

/// Result of checking a series directory against its manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestVerification {
    /// Pages the manifest records as done
    pub checked: usize,
    /// Done pages found with the recorded size
    pub intact: usize,
    /// Done pages missing on disk
    pub missing: Vec<String>,
    /// Done pages whose size differs from the record
    pub size_mismatch: Vec<String>,
    /// Pages that failed or were not attempted in the run
    pub incomplete: usize,
}

impl ManifestVerification {
    /// Whether every recorded page is intact and none were left incomplete
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.size_mismatch.is_empty() && self.incomplete == 0
    }
}

impl RunManifest {
    /// Create a manifest for a run
    pub fn new(
        target_url: impl Into<String>,
        series_title: impl Into<String>,
        mode: DownloadMode,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            target_url: target_url.into(),
            series_title: series_title.into(),
            mode,
            state: JobStatus::Pending,
            chapters: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Manifest path for a series directory
    pub fn path_for(series_dir: &Path) -> PathBuf {
        series_dir.join(MANIFEST_FILE_NAME)
    }

    /// Schema version of this manifest
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Keep the original creation time of an earlier manifest
    pub fn inherit_created_at(&mut self, previous: &RunManifest) {
        self.created_at = previous.created_at;
    }

    /// Recorded sizes of done pages keyed by `<chapter dir>/<page stem>`
    pub fn size_index(&self) -> HashMap<String, u64> {
        self.chapters
            .iter()
            .flat_map(|chapter| {
                chapter.pages.iter().filter_map(move |page| {
                    let path = page.path.as_deref()?;
                    let bytes = page.bytes?;
                    (page.status == PageStatus::Done).then(|| (stem_key(path), bytes))
                })
            })
            .collect()
    }

    /// Check the pages under `series_dir` against this manifest
    pub fn verify(&self, series_dir: &Path) -> ManifestVerification {
        let mut result = ManifestVerification::default();
        for page in self.chapters.iter().flat_map(|c| c.pages.iter()) {
            if page.status != PageStatus::Done {
                result.incomplete += 1;
                continue;
            }
            result.checked += 1;
            let Some(relative) = page.path.as_deref() else {
                result.missing.push(page.url.clone());
                continue;
            };
            match std::fs::metadata(series_dir.join(relative)) {
                Ok(meta) if Some(meta.len()) == page.bytes => result.intact += 1,
                Ok(_) => result.size_mismatch.push(relative.to_string()),
                Err(_) => result.missing.push(relative.to_string()),
            }
        }
        result
    }

    fn lock_file(path: &Path) -> Result<File, ManifestError> {
        let lock_path = path.with_extension("lock");
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ManifestError::LockError(format!("Failed to create lock file: {e}")))
    }

    /// Save the manifest atomically while holding an exclusive lock
    pub fn save(&mut self, path: &Path) -> Result<(), ManifestError> {
        self.updated_at = chrono::Utc::now().timestamp_millis();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ManifestError::SerializationError(e.to_string()))?;

        let mut lock = RwLock::new(Self::lock_file(path)?);
        let _guard = lock
            .write()
            .map_err(|e| ManifestError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ManifestError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ManifestError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ManifestError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ManifestError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ManifestError::IoError(format!("Failed to persist temp file: {e}")))?;

        sync_directory(parent_dir);

        info!(
            path = %path.display(),
            chapters = self.chapters.len(),
            state = %self.state,
            "Run manifest saved"
        );
        Ok(())
    }

    /// Load a manifest while holding a shared lock
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        debug!(path = %path.display(), "Loading run manifest");

        let lock = RwLock::new(Self::lock_file(path)?);
        let _guard = lock
            .read()
            .map_err(|e| ManifestError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ManifestError::IoError(e.to_string()))?;
        if metadata.len() > MAX_MANIFEST_SIZE {
            return Err(ManifestError::TooLarge {
                size: metadata.len(),
                max: MAX_MANIFEST_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ManifestError::IoError(e.to_string()))?;
        let manifest: RunManifest = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize run manifest");
            ManifestError::DeserializationError(e.to_string())
        })?;

        if manifest.schema_version != SCHEMA_VERSION {
            return Err(ManifestError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: manifest.schema_version,
            });
        }

        Ok(manifest)
    }

    /// Load the manifest of `series_dir` if there is one
    ///
    /// An unreadable manifest is logged and treated as absent; resume then
    /// falls back to checking files without recorded sizes.
    pub fn load_existing(series_dir: &Path) -> Option<Self> {
        let path = Self::path_for(series_dir);
        if !path.is_file() {
            return None;
        }
        match Self::load(&path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable run manifest");
                None
            }
        }
    }
}

/// `<dir>/<stem>` of a relative page path
pub fn stem_key(relative_path: &str) -> String {
    let path = Path::new(relative_path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => format!("{}/{}", parent.to_string_lossy(), stem),
        None => stem,
    }
}
