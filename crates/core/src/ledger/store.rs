//! Storage trait behind the progress ledger.

use std::collections::HashSet;

use super::types::{LedgerCounts, LedgerError, ProgressEntry, RunInfo, StoredEntry};

/// Append-only storage of progress entries, partitioned by run identity.
///
/// Appends must be durable when they return.
pub trait LedgerStore: Send + Sync {
    /// Appends entries atomically, in order.
    fn append(&self, run_id: &str, entries: &[ProgressEntry]) -> Result<(), LedgerError>;

    /// Ids with at least one `Done` entry.
    fn done_ids(&self, run_id: &str) -> Result<HashSet<u64>, LedgerError>;

    /// Whether `record_id` has a `Done` entry.
    fn contains_done(&self, run_id: &str, record_id: u64) -> Result<bool, LedgerError>;

    /// Every entry in append order.
    fn entries(&self, run_id: &str) -> Result<Vec<StoredEntry>, LedgerError>;

    fn counts(&self, run_id: &str) -> Result<LedgerCounts, LedgerError>;

    fn run_info(&self, run_id: &str) -> Result<Option<RunInfo>, LedgerError>;

    /// Records the input fingerprint for a run, creating the run if needed.
    fn set_fingerprint(&self, run_id: &str, fingerprint: &str) -> Result<(), LedgerError>;
}
