//! Run-scoped view over a ledger store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::metrics;

use super::sqlite::SqliteLedgerStore;
use super::store::LedgerStore;
use super::types::{LedgerCounts, LedgerError, Outcome, ProgressEntry, StoredEntry};

/// File name of the ledger inside the output folder.
pub const LEDGER_FILE: &str = "_progress.sqlite";

/// Durable record of which ids a run has finished.
///
/// The ledger only answers "can this id be skipped on resume". Payloads are
/// always read from shards, never from here.
#[derive(Clone)]
pub struct ProgressLedger {
    store: Arc<dyn LedgerStore>,
    run_id: String,
}

impl ProgressLedger {
    /// Opens the ledger stored in `output_dir`, creating the folder if needed.
    ///
    /// The run identity is the canonical output folder path.
    pub fn open(output_dir: &Path) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(output_dir).map_err(|e| LedgerError::Io {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        let run_id = run_identity(output_dir)?;
        let store = SqliteLedgerStore::new(&output_dir.join(LEDGER_FILE))?;
        debug!(run_id = %run_id, "Opened progress ledger");
        Ok(Self::with_store(Arc::new(store), run_id))
    }

    /// An in-memory ledger (useful for testing).
    pub fn in_memory(run_id: impl Into<String>) -> Result<Self, LedgerError> {
        Ok(Self::with_store(
            Arc::new(SqliteLedgerStore::in_memory()?),
            run_id,
        ))
    }

    pub fn with_store(store: Arc<dyn LedgerStore>, run_id: impl Into<String>) -> Self {
        Self {
            store,
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Durably appends one outcome.
    pub fn append(&self, record_id: u64, outcome: Outcome) -> Result<(), LedgerError> {
        let entry = ProgressEntry {
            record_id,
            outcome,
            shard_id: None,
        };
        self.append_batch(&[entry])
    }

    /// Durably appends several outcomes in one transaction.
    pub fn append_batch(&self, entries: &[ProgressEntry]) -> Result<(), LedgerError> {
        self.store.append(&self.run_id, entries)?;
        for entry in entries {
            metrics::LEDGER_APPENDS
                .with_label_values(&[entry.outcome.as_str()])
                .inc();
        }
        Ok(())
    }

    pub fn contains_done(&self, record_id: u64) -> Result<bool, LedgerError> {
        self.store.contains_done(&self.run_id, record_id)
    }

    /// Ids marked done for this run.
    pub fn load(&self) -> Result<HashSet<u64>, LedgerError> {
        self.load_run(&self.run_id)
    }

    /// Ids marked done for any run identity stored in the same ledger.
    pub fn load_run(&self, run_identity: &str) -> Result<HashSet<u64>, LedgerError> {
        self.store.done_ids(run_identity)
    }

    pub fn entries(&self) -> Result<Vec<StoredEntry>, LedgerError> {
        self.store.entries(&self.run_id)
    }

    pub fn counts(&self) -> Result<LedgerCounts, LedgerError> {
        self.store.counts(&self.run_id)
    }

    /// Stores the input fingerprint. Returns `false` and warns when a previous
    /// run over this folder used different input.
    pub fn check_fingerprint(&self, fingerprint: &str) -> Result<bool, LedgerError> {
        let previous = self
            .store
            .run_info(&self.run_id)?
            .and_then(|info| info.input_fingerprint);

        let matches = match previous.as_deref() {
            Some(previous) if previous != fingerprint => {
                warn!(
                    run_id = %self.run_id,
                    previous = %previous,
                    current = %fingerprint,
                    "Input differs from the previous run over this output folder; record ids may not line up"
                );
                false
            }
            _ => true,
        };

        self.store.set_fingerprint(&self.run_id, fingerprint)?;
        Ok(matches)
    }
}

fn run_identity(output_dir: &Path) -> Result<String, LedgerError> {
    let canonical: PathBuf = output_dir.canonicalize().map_err(|e| LedgerError::Io {
        path: output_dir.to_path_buf(),
        source: e,
    })?;
    Ok(canonical.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_then_load() {
        let ledger = ProgressLedger::in_memory("run").unwrap();
        ledger.append(0, Outcome::Done).unwrap();
        ledger
            .append_batch(&[ProgressEntry::done(5, 1), ProgressEntry::failed(6)])
            .unwrap();

        assert_eq!(ledger.load().unwrap(), HashSet::from([0, 5]));
        assert!(ledger.contains_done(5).unwrap());
        assert!(!ledger.contains_done(6).unwrap());
        assert_eq!(ledger.counts().unwrap(), LedgerCounts { done: 2, failed: 1 });
    }

    #[test]
    fn test_open_uses_canonical_identity() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");

        let ledger = ProgressLedger::open(&out).unwrap();
        ledger.append(3, Outcome::Done).unwrap();
        assert!(out.join(LEDGER_FILE).exists());

        // The same folder reached through a different spelling is the same run.
        let again = ProgressLedger::open(&dir.path().join("out/../out")).unwrap();
        assert_eq!(again.run_id(), ledger.run_id());
        assert!(again.contains_done(3).unwrap());
    }

    #[test]
    fn test_fingerprint_mismatch_detected() {
        let ledger = ProgressLedger::in_memory("run").unwrap();
        assert!(ledger.check_fingerprint("aaa").unwrap());
        assert!(ledger.check_fingerprint("aaa").unwrap());
        assert!(!ledger.check_fingerprint("bbb").unwrap());
    }
}
