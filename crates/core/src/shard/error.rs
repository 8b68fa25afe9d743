//! Error types for the shard module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting shards.
#[derive(Debug, Error)]
pub enum ShardError {
    /// Writing a shard member or marker failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be encoded or a marker could not be decoded.
    #[error("Failed to serialize shard metadata for {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },

    /// The shard already exists on disk and sealed shards are never overwritten.
    #[error("Shard {shard_id} already exists at {path}")]
    AlreadyExists { shard_id: u64, path: PathBuf },

    /// The blocking write task was cancelled or panicked.
    #[error("Shard write task failed: {0}")]
    TaskFailed(String),
}

impl ShardError {
    /// Creates an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serialization(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Serialization {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a second attempt on the same path might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::TaskFailed(_))
    }
}
