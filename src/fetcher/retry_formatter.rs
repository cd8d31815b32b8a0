//! Retry classification and message formatting for page downloads.
//!
//! HTTP failures are classified into [`RetryErrorType`] so the worker pool can
//! decide whether to retry and so log lines read the same for every site.

use crate::connector::ConnectorError;
use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Classification of transport failures for retry decisions and messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 403; image hosts answer it when they throttle hotlinking
    Forbidden,
    /// Other client errors (4xx, except 403, 408 and 429)
    ClientError(u16),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode) -> Self {
        let code = status.as_u16();
        match code {
            408 => Self::NetworkTimeout,
            429 => Self::RateLimit,
            403 => Self::Forbidden,
            400..=499 => Self::ClientError(code),
            500..=599 => Self::ServerError(code),
            _ => Self::NetworkGeneric,
        }
    }

    /// Classify a reqwest error
    pub fn from_reqwest_error(error: &ReqwestError) -> Self {
        if error.is_timeout() {
            Self::NetworkTimeout
        } else if error.is_connect() {
            Self::NetworkOffline
        } else if let Some(status) = error.status() {
            Self::from_status(status)
        } else {
            Self::NetworkGeneric
        }
    }

    /// User-friendly description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::Forbidden => "access forbidden",
            Self::ClientError(code) => match code {
                404 => "page not found",
                410 => "page removed",
                _ => "client error",
            },
            Self::NetworkGeneric => "network error",
        }
    }

    /// Whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ClientError(_))
    }

    /// Convert into the connector error taxonomy
    pub fn into_connector_error(self, url: &str, detail: impl Into<String>) -> ConnectorError {
        let detail = detail.into();
        match self {
            Self::NetworkTimeout => ConnectorError::Timeout(format!("{url}: {detail}")),
            Self::ClientError(status) => ConnectorError::Rejected {
                status,
                url: url.to_string(),
            },
            Self::NetworkOffline
            | Self::RateLimit
            | Self::Forbidden
            | Self::ServerError(_)
            | Self::NetworkGeneric => {
                ConnectorError::TransientNetwork(format!(
                    "{url}: {} ({detail})",
                    self.description()
                ))
            }
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Unit being downloaded (e.g. "c001/p003")
    pub unit: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Create a retry context
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        backoff_duration: Duration,
        unit: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            backoff_duration,
            unit: unit.into(),
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.unit,
            self.attempt,
            self.max_attempts,
            self.error_message,
            self.backoff_duration.as_secs_f64()
        )
    }

    /// Format final failure summary.
    pub fn format_failure(&self) -> String {
        format!(
            "[FAILED] {} failed after {} attempts: {}",
            self.unit, self.attempt, self.error_message
        )
    }
}
