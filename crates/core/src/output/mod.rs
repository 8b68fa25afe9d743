//! Run-level files of the output folder: the error log, the manifest and
//! the run summary.

mod error_log;
mod manifest;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::shard::write_atomic;

pub use error_log::{compact_error_log, read_error_log, ErrorEntry, ErrorLog, ERROR_LOG_FILE};
pub use manifest::{Manifest, ManifestShard, MANIFEST_FILE};

/// File name of the run summary inside the output folder.
pub const SUMMARY_FILE: &str = "summary.json";

/// File name of the metrics dump inside the output folder.
pub const METRICS_FILE: &str = "metrics.prom";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },
}

impl OutputError {
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
}

impl From<crate::shard::ShardError> for OutputError {
    fn from(e: crate::shard::ShardError) -> Self {
        match e {
            crate::shard::ShardError::Io { path, source } => Self::Io { path, source },
            other => Self::Serialization {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Atomically replaces `path` with pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| OutputError::serialization(path, e))?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Atomically replaces `path` with text.
pub fn write_text(path: &Path, text: &str) -> Result<(), OutputError> {
    write_atomic(path, text.as_bytes())?;
    Ok(())
}
