//! Error types for the source module.

use std::path::PathBuf;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors raised while opening or reading the input.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The input does not match the declared format or lacks a required column.
    #[error("Invalid input format in {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// A single row could not be decoded.
    #[error("Malformed row {row} in {path}: {reason}")]
    MalformedRow {
        path: PathBuf,
        row: u64,
        reason: String,
    },

    /// The input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The resume filter could not be loaded.
    #[error("Failed to load progress: {0}")]
    Ledger(#[from] LedgerError),
}

impl SourceError {
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
