//! CLI command for listing registered connectors

use crate::registry::ConnectorRegistry;
use clap::Args;
use serde_json::json;

use super::{Cli, CliError, OutputFormat};

/// Sources subcommand
#[derive(Debug, Args)]
pub struct SourcesCommand {
    /// Only show connectors serving this host (subdomains match)
    #[arg(long)]
    pub host: Option<String>,
}

impl SourcesCommand {
    /// Execute the sources command
    pub fn execute(&self, cli: &Cli, registry: &ConnectorRegistry) -> Result<(), CliError> {
        let connectors: Vec<(String, Vec<String>)> = match &self.host {
            Some(host) => {
                let url = format!("https://{}/", host.trim().trim_end_matches('/'));
                match registry.resolve(&url) {
                    Ok(handle) => registry
                        .connectors()
                        .into_iter()
                        .filter(|(name, _)| name == handle.name())
                        .collect(),
                    Err(crate::registry::RegistryError::UnsupportedSite(_)) => Vec::new(),
                    Err(e) => return Err(e.into()),
                }
            }
            None => registry.connectors(),
        };

        match cli.output_format {
            OutputFormat::Json => {
                let listing: Vec<_> = connectors
                    .iter()
                    .map(|(name, domains)| json!({ "name": name, "domains": domains }))
                    .collect();
                println!("{}", json!(listing));
            }
            OutputFormat::Human => {
                if connectors.is_empty() {
                    println!("No connectors registered.");
                    return Ok(());
                }
                println!("Found {} connector(s):\n", connectors.len());
                for (name, domains) in &connectors {
                    println!("{name} | {}", domains.join(", "));
                }
            }
        }

        Ok(())
    }
}
