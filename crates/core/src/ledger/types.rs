//! Types for the progress ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to prepare ledger at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid ledger entry: {0}")]
    InvalidEntry(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Final outcome of a record within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Stored in a durable shard.
    Done,
    /// Failed and written to the error log.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One appended ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub record_id: u64,
    pub outcome: Outcome,
    /// Shard holding the record, for `Done` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<u64>,
}

impl ProgressEntry {
    pub fn done(record_id: u64, shard_id: u64) -> Self {
        Self {
            record_id,
            outcome: Outcome::Done,
            shard_id: Some(shard_id),
        }
    }

    pub fn failed(record_id: u64) -> Self {
        Self {
            record_id,
            outcome: Outcome::Failed,
            shard_id: None,
        }
    }
}

/// A stored entry with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Monotonic append sequence.
    pub seq: i64,
    pub entry: ProgressEntry,
    pub recorded_at: DateTime<Utc>,
}

/// Bookkeeping for a run identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub input_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    /// Distinct ids with a `Done` entry.
    pub done: u64,
    /// Distinct ids whose only entries are `Failed`.
    pub failed: u64,
}
