//! Connector registry
//!
//! Maps the host of a target URL to the connector that serves it. Connectors
//! are added through [`RegistryBuilder`] during start-up; the built
//! [`ConnectorRegistry`] is read-only and cheap to share.
//!
//! Host matching is case-insensitive and accepts subdomains: a connector
//! registered for `truyenqqno.com` also serves `www.truyenqqno.com` but not
//! `eviltruyenqqno.com`. When several connectors match, the one registered
//! first wins.

use crate::connector::{Connector, ConnectorHandle};
use std::sync::Arc;
use tracing::debug;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Invalid or conflicting registration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No connector serves the URL's host
    #[error("unsupported site: {0}")]
    UnsupportedSite(String),

    /// Target is not an absolute http(s) URL
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending input
        url: String,
        /// Parse failure
        reason: String,
    },
}

#[derive(Clone)]
struct Registration {
    domains: Vec<String>,
    handle: ConnectorHandle,
}

/// Registration phase of a [`ConnectorRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Registration>,
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under the domains it reports
    ///
    /// Fails when a domain is malformed, already claimed, or when another
    /// connector uses the same name.
    pub fn register(mut self, connector: Arc<dyn Connector>) -> Result<Self, RegistryError> {
        let handle = ConnectorHandle::new(connector);

        if self.entries.iter().any(|e| e.handle.key() == handle.key()) {
            return Err(RegistryError::Configuration(format!(
                "connector '{}' is already registered",
                handle.name()
            )));
        }

        let mut domains = Vec::new();
        for raw in handle.domains() {
            let domain = normalize_domain(&raw).ok_or_else(|| {
                RegistryError::Configuration(format!(
                    "connector '{}' has invalid domain pattern '{raw}'",
                    handle.name()
                ))
            })?;

            let claimed = self
                .entries
                .iter()
                .find(|e| e.domains.contains(&domain))
                .map(|e| e.handle.name().to_string())
                .or_else(|| domains.contains(&domain).then(|| handle.name().to_string()));
            if let Some(owner) = claimed {
                return Err(RegistryError::Configuration(format!(
                    "domain '{domain}' is already registered by '{owner}'"
                )));
            }
            domains.push(domain);
        }

        if domains.is_empty() {
            return Err(RegistryError::Configuration(format!(
                "connector '{}' declares no domains",
                handle.name()
            )));
        }

        debug!(connector = handle.name(), domains = ?domains, "Registered connector");
        self.entries.push(Registration { domains, handle });
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> ConnectorRegistry {
        ConnectorRegistry {
            entries: self.entries,
        }
    }
}

/// Read-only domain → connector table
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    entries: Vec<Registration>,
}

impl ConnectorRegistry {
    /// Start a registration phase
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Find the connector serving `url`
    pub fn resolve(&self, url: &str) -> Result<ConnectorHandle, RegistryError> {
        let host = host_of(url)?;
        self.entries
            .iter()
            .find(|entry| entry.domains.iter().any(|d| host_matches(&host, d)))
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| RegistryError::UnsupportedSite(host))
    }

    /// Registered connectors as `(name, domains)`, in registration order
    pub fn connectors(&self) -> Vec<(String, Vec<String>)> {
        self.entries
            .iter()
            .map(|e| (e.handle.name().to_string(), e.domains.clone()))
            .collect()
    }

    /// Number of registered connectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connector is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.handle))
            .finish()
    }
}

fn normalize_domain(raw: &str) -> Option<String> {
    let domain = raw
        .trim()
        .trim_start_matches("*.")
        .trim_matches('.')
        .to_ascii_lowercase();
    let valid = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    valid.then_some(domain)
}

fn host_of(url: &str) -> Result<String, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let parsed = url::Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;
    Ok(host.trim_end_matches('.').to_ascii_lowercase())
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
