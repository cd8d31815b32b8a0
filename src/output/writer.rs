//! Atomic page writer
//!
//! Bytes are written to a temporary file inside the destination directory,
//! flushed and fsynced, then renamed over the final path. A [`StagedWrite`]
//! that is dropped without [`StagedWrite::commit`] removes its temp file, so
//! a crash or cancellation never leaves a partial page at a final path.
//! Temp files orphaned by a killed process are swept before the next run.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::path::IMAGE_EXTENSIONS;
use super::{sync_directory, StorageError, StorageResult};
use crate::downloader::unit::PageDestination;

/// Bytes inspected when checking whether a file is an HTML page
const SNIFF_LEN: usize = 512;

/// Suffix of staged page files
const PART_SUFFIX: &str = ".part";

/// Opening tags that mark an HTML document
const HTML_PREFIXES: [&[u8]; 7] = [
    b"<!doctype html",
    b"<html",
    b"<head",
    b"<body",
    b"<title",
    b"<meta",
    b"<script",
];

/// Whether a payload looks like an HTML document rather than an image
///
/// Only HTML opening tags count; XML-based images such as SVG start with
/// `<` too and are accepted.
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head = bytes
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(bytes)
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(SNIFF_LEN)
        .map(u8::to_ascii_lowercase)
        .collect::<Vec<u8>>();
    HTML_PREFIXES.iter().any(|tag| head.starts_with(tag))
}

/// A page written to a temp file but not yet visible at its final path
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    final_path: PathBuf,
    bytes: u64,
}

impl StagedWrite {
    /// Path the page will have after commit
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Atomically move the staged page into place
    pub fn commit(self) -> StorageResult<(PathBuf, u64)> {
        let final_path = self.final_path;
        self.temp
            .persist(&final_path)
            .map_err(|e| StorageError::io(&final_path, "persist", e.error))?;

        if let Some(parent) = final_path.parent() {
            sync_directory(parent);
            remove_stale_siblings(&final_path);
        }

        Ok((final_path, self.bytes))
    }
}

/// Drop page files left under the same stem with a different extension
fn remove_stale_siblings(final_path: &Path) {
    let (Some(parent), Some(stem), Some(ext)) = (
        final_path.parent(),
        final_path.file_stem().and_then(|s| s.to_str()),
        final_path.extension().and_then(|s| s.to_str()),
    ) else {
        return;
    };

    for other in IMAGE_EXTENSIONS.iter().filter(|e| **e != ext) {
        let sibling = parent.join(format!("{stem}.{other}"));
        if sibling.is_file() {
            if let Err(e) = fs::remove_file(&sibling) {
                warn!(path = %sibling.display(), error = %e, "Failed to remove stale page");
            }
        }
    }
}

/// Writes pages under the output root
#[derive(Debug, Clone, Default)]
pub struct StorageWriter;

impl StorageWriter {
    /// Create a writer
    pub fn new() -> Self {
        Self
    }

    /// Write `bytes` to a temp file next to the destination
    pub fn stage(
        &self,
        destination: &PageDestination,
        extension: &str,
        bytes: &[u8],
    ) -> StorageResult<StagedWrite> {
        let dir = &destination.directory;
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, "create directory", e))?;

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", destination.stem))
            .suffix(PART_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| StorageError::io(dir, "create temp file", e))?;

        temp.write_all(bytes)
            .map_err(|e| StorageError::io(temp.path(), "write", e))?;
        temp.flush()
            .map_err(|e| StorageError::io(temp.path(), "flush", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(temp.path(), "sync", e))?;

        Ok(StagedWrite {
            temp,
            final_path: destination.path_with_extension(extension),
            bytes: bytes.len() as u64,
        })
    }

    /// Remove staged temp files left in `dir` by an interrupted run
    ///
    /// Returns how many were removed. A missing directory has nothing to sweep.
    pub fn sweep_partials(&self, dir: &Path) -> usize {
        let Ok(entries) = fs::read_dir(dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with('.') || !name.ends_with(PART_SUFFIX) {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to remove partial page")
                }
            }
        }
        if removed > 0 {
            debug!(dir = %dir.display(), removed, "Swept partial pages");
        }
        removed
    }

    /// Stage and commit in one step
    pub fn write_sync(
        &self,
        destination: &PageDestination,
        extension: &str,
        bytes: &[u8],
    ) -> StorageResult<(PathBuf, u64)> {
        let staged = self.stage(destination, extension, bytes)?;
        let result = staged.commit()?;
        debug!(path = %result.0.display(), bytes = result.1, "Page written");
        Ok(result)
    }

    /// Write a page without blocking the async runtime
    pub async fn write(
        &self,
        destination: PageDestination,
        extension: &'static str,
        bytes: Vec<u8>,
    ) -> StorageResult<(PathBuf, u64)> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write_sync(&destination, extension, &bytes))
            .await
            .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }

    /// Find a sane page file already at `destination`
    ///
    /// A file qualifies when it has a known image extension, is non-empty,
    /// does not start like an HTML page and, when `expected_size` is given,
    /// has exactly that size.
    pub fn find_existing(
        &self,
        destination: &PageDestination,
        expected_size: Option<u64>,
    ) -> Option<(PathBuf, u64)> {
        IMAGE_EXTENSIONS.iter().find_map(|ext| {
            let path = destination.path_with_extension(ext);
            let size = fs::metadata(&path).ok().filter(|m| m.is_file())?.len();
            if size == 0 || expected_size.is_some_and(|expected| expected != size) {
                return None;
            }
            if file_looks_like_html(&path) {
                return None;
            }
            Some((path, size))
        })
    }
}

fn file_looks_like_html(path: &Path) -> bool {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    match File::open(path) {
        Ok(file) => {
            if file.take(SNIFF_LEN as u64).read_to_end(&mut head).is_err() {
                return true;
            }
            looks_like_html(&head)
        }
        Err(_) => true,
    }
}
