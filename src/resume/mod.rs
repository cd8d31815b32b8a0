//! Resume capability for download jobs
//!
//! Pages already on disk are detected by the storage writer; the run manifest
//! adds the recorded size of every page so truncated files are fetched again.

pub mod manifest;

pub use manifest::{
    ManifestChapter, ManifestError, ManifestPage, ManifestVerification, PageStatus, RunManifest,
    MANIFEST_FILE_NAME,
};
