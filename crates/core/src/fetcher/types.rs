//! Types for the fetcher module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The request did not complete within the fetch timeout.
    #[error("timeout")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("http error {0}")]
    HttpError(u16),

    /// The body could not be turned into a storable payload.
    #[error("conversion error")]
    ConversionError,

    /// Connection, DNS, TLS or body transfer failure.
    #[error("network error")]
    NetworkError,
}

impl FetchErrorKind {
    /// Whether a later attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::NetworkError => true,
            Self::HttpError(status) => matches!(status, 408 | 429 | 500..=599),
            Self::ConversionError => false,
        }
    }

    /// Short label used in metrics and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::HttpError(_) => "http_error",
            Self::ConversionError => "conversion_error",
            Self::NetworkError => "network_error",
        }
    }
}

/// A failed fetch with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NetworkError, message)
    }

    pub fn http(status: u16) -> Self {
        Self::new(FetchErrorKind::HttpError(status), format!("HTTP {}", status))
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Body and headers of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Summary returned by a pool once it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Records emitted, whether done or failed.
    pub completed: usize,
    /// In-flight records dropped because the abort grace period expired.
    pub abandoned: usize,
    /// Whether the pool stopped because of an abort.
    pub aborted: bool,
}
