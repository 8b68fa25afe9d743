//! Types for the run orchestrator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::output::OutputError;
use crate::record::Record;
use crate::shard::{FlushedShard, ShardError};
use crate::source::SourceError;

/// Errors that stop a run before any work starts, or break its bookkeeping.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The input could not be opened or validated.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The progress ledger could not be opened or written.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The output folder could not be scanned or reconciled.
    #[error("shard error: {0}")]
    Shard(#[from] ShardError),

    /// A run-level output file could not be written.
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// The production fetcher could not be built.
    #[error("fetcher error: {0}")]
    Fetch(#[from] crate::fetcher::FetchError),

    /// `run` was called on an orchestrator that already ran.
    #[error("orchestrator already started (state: {0})")]
    AlreadyStarted(&'static str),
}

/// Why a single worker stopped early.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A shard could not be persisted within its attempt budget.
    #[error("shard flush failed: {0}")]
    Io(#[from] ShardError),

    /// The worker or its fetch pool panicked.
    #[error("worker crashed: {0}")]
    Crash(String),
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    #[default]
    Idle,
    /// Reconciling the output folder and splitting the input.
    Partitioning,
    /// Workers are fetching.
    Running,
    /// Every worker has stopped taking input and is sealing its last shard.
    Draining,
    /// Every input record is done or failed and logged.
    Done,
    /// A worker exhausted its restart budget, or bookkeeping failed.
    Failed,
    /// Stopped on request; the output is valid and resumable.
    Aborted,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Partitioning => "partitioning",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live counters published while a run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub state: OrchestratorState,
    pub total_input: u64,
    pub skipped_already_done: u64,
    /// Records stored in a durable shard during this run.
    pub done: u64,
    pub failed: u64,
    pub shards_written: u64,
    pub restarts: u32,
}

/// Final report of a run, also written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub state: OrchestratorState,
    pub output_folder: PathBuf,
    pub total_input: u64,
    /// Ids already done before this run started.
    pub skipped_already_done: u64,
    /// Ids stored in a shard during this run.
    pub done: u64,
    /// Ids that failed during this run and are in the error log.
    pub failed: u64,
    /// Ids neither done nor failed; non-zero only after an abort or failure.
    pub unprocessed: u64,
    /// Ids done across every run over this output folder.
    pub done_total: u64,
    pub shards_written: u64,
    pub restarts: u32,
    pub error_log: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Whether every input record reached a final outcome.
    pub fn is_complete(&self) -> bool {
        self.state == OrchestratorState::Done
    }
}

/// Messages from workers to the orchestrator event loop.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// A shard and its commit marker are durable.
    ShardFlushed { worker: usize, flushed: FlushedShard },
    /// A record failed and must be logged.
    RecordFailed { worker: usize, record: Record },
    /// The worker stopped taking input and is sealing its last shard.
    Draining { worker: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OrchestratorState::Idle.is_terminal());
        assert!(!OrchestratorState::Draining.is_terminal());
        assert!(OrchestratorState::Done.is_terminal());
        assert!(OrchestratorState::Failed.is_terminal());
        assert!(OrchestratorState::Aborted.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&OrchestratorState::Partitioning).unwrap();
        assert_eq!(json, "\"partitioning\"");
        assert_eq!(OrchestratorState::Aborted.to_string(), "aborted");
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::AlreadyStarted("running");
        assert_eq!(err.to_string(), "orchestrator already started (state: running)");

        let err = WorkerError::Crash("boom".to_string());
        assert_eq!(err.to_string(), "worker crashed: boom");
    }
}
