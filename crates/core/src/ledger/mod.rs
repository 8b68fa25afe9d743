//! Progress ledger for resumable runs.
//!
//! Outcomes are appended only after the owning shard is durable, so a `Done`
//! entry always points at data that exists on disk.

mod progress;
mod sqlite;
mod store;
mod types;

pub use progress::{ProgressLedger, LEDGER_FILE};
pub use sqlite::SqliteLedgerStore;
pub use store::LedgerStore;
pub use types::{LedgerCounts, LedgerError, Outcome, ProgressEntry, RunInfo, StoredEntry};
