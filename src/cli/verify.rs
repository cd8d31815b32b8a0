//! Verify subcommand

use crate::resume::{RunManifest, MANIFEST_FILE_NAME};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use super::{Cli, CliError, OutputFormat};

/// Re-check a series directory against the manifest of its last run
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Series directory containing the run manifest
    pub series_dir: PathBuf,
}

impl VerifyCommand {
    /// Execute the verification; `Ok(false)` when pages are missing or incomplete
    pub fn execute(&self, cli: &Cli) -> Result<bool, CliError> {
        let path = RunManifest::path_for(&self.series_dir);
        if !path.is_file() {
            return Err(CliError::InvalidArgument(format!(
                "{} has no {MANIFEST_FILE_NAME}",
                self.series_dir.display()
            )));
        }

        let manifest = RunManifest::load(&path)?;
        let verification = manifest.verify(&self.series_dir);
        info!(
            series = %manifest.series_title,
            checked = verification.checked,
            intact = verification.intact,
            "Verified series directory"
        );

        match cli.output_format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "series_title": manifest.series_title,
                    "target_url": manifest.target_url,
                    "state": manifest.state,
                    "complete": verification.is_complete(),
                    "verification": verification,
                });
                println!("{output}");
            }
            OutputFormat::Human => {
                println!("Series: {}", manifest.series_title);
                println!("Last run: {}", manifest.state);
                println!(
                    "Pages: {}/{} intact, {} not downloaded",
                    verification.intact, verification.checked, verification.incomplete
                );
                for missing in &verification.missing {
                    println!("  missing: {missing}");
                }
                for mismatch in &verification.size_mismatch {
                    println!("  size mismatch: {mismatch}");
                }
                if verification.is_complete() {
                    println!("Verify passed");
                }
            }
        }

        Ok(verification.is_complete())
    }
}
