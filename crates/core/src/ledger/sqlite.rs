//! SQLite-backed ledger store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::LedgerStore;
use super::types::{
    LedgerCounts, LedgerError, Outcome, ProgressEntry, RunInfo, StoredEntry,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS progress_entries (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        record_id INTEGER NOT NULL,
        outcome TEXT NOT NULL,
        shard_id INTEGER,
        recorded_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_progress_run_record
        ON progress_entries(run_id, record_id);

    CREATE TABLE IF NOT EXISTS runs (
        run_id TEXT PRIMARY KEY,
        input_fingerprint TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// SQLite-backed ledger store.
///
/// Uses WAL with `synchronous=FULL`, so a committed append survives a crash.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Opens or creates the ledger database at `path`.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::initialize(conn)
    }

    /// Create an in-memory ledger store (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("ledger connection lock poisoned".to_string()))
    }
}

fn to_sql_id(id: u64) -> Result<i64, LedgerError> {
    i64::try_from(id).map_err(|_| LedgerError::InvalidEntry(format!("id {} out of range", id)))
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl LedgerStore for SqliteLedgerStore {
    fn append(&self, run_id: &str, entries: &[ProgressEntry]) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO progress_entries (run_id, record_id, outcome, shard_id, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                let shard_id = entry.shard_id.map(to_sql_id).transpose()?;
                stmt.execute(params![
                    run_id,
                    to_sql_id(entry.record_id)?,
                    entry.outcome.as_str(),
                    shard_id,
                    now,
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO runs (run_id, input_fingerprint, created_at, updated_at)
             VALUES (?1, NULL, ?2, ?2)
             ON CONFLICT(run_id) DO UPDATE SET updated_at = excluded.updated_at",
            params![run_id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn done_ids(&self, run_id: &str) -> Result<HashSet<u64>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT record_id FROM progress_entries WHERE run_id = ?1 AND outcome = 'done'",
        )?;
        let ids = stmt
            .query_map(params![run_id], |row| row.get::<_, i64>(0))?
            .map(|id| id.map(|id| id as u64))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn contains_done(&self, run_id: &str, record_id: u64) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM progress_entries
                 WHERE run_id = ?1 AND record_id = ?2 AND outcome = 'done' LIMIT 1",
                params![run_id, to_sql_id(record_id)?],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn entries(&self, run_id: &str) -> Result<Vec<StoredEntry>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT seq, record_id, outcome, shard_id, recorded_at
             FROM progress_entries WHERE run_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, record_id, outcome, shard_id, recorded_at)| {
                let outcome = Outcome::parse(&outcome).ok_or_else(|| {
                    LedgerError::InvalidEntry(format!("unknown outcome '{}' at seq {}", outcome, seq))
                })?;
                Ok(StoredEntry {
                    seq,
                    entry: ProgressEntry {
                        record_id: record_id as u64,
                        outcome,
                        shard_id: shard_id.map(|id| id as u64),
                    },
                    recorded_at: parse_time(&recorded_at),
                })
            })
            .collect()
    }

    fn counts(&self, run_id: &str) -> Result<LedgerCounts, LedgerError> {
        let conn = self.conn()?;
        let (done, failed) = conn.query_row(
            "SELECT
                COUNT(DISTINCT CASE WHEN outcome = 'done' THEN record_id END),
                (SELECT COUNT(DISTINCT f.record_id) FROM progress_entries f
                 WHERE f.run_id = ?1 AND f.outcome = 'failed'
                   AND NOT EXISTS (
                       SELECT 1 FROM progress_entries d
                       WHERE d.run_id = ?1 AND d.record_id = f.record_id AND d.outcome = 'done'))
             FROM progress_entries WHERE run_id = ?1",
            params![run_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(LedgerCounts {
            done: done as u64,
            failed: failed as u64,
        })
    }

    fn run_info(&self, run_id: &str) -> Result<Option<RunInfo>, LedgerError> {
        let conn = self.conn()?;
        let info = conn
            .query_row(
                "SELECT run_id, input_fingerprint, created_at, updated_at FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunInfo {
                        run_id: row.get(0)?,
                        input_fingerprint: row.get(1)?,
                        created_at: parse_time(&row.get::<_, String>(2)?),
                        updated_at: parse_time(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    fn set_fingerprint(&self, run_id: &str, fingerprint: &str) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (run_id, input_fingerprint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(run_id) DO UPDATE SET
                input_fingerprint = excluded.input_fingerprint,
                updated_at = excluded.updated_at",
            params![run_id, fingerprint, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_query() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store
            .append(
                "run",
                &[
                    ProgressEntry::done(1, 0),
                    ProgressEntry::failed(2),
                    ProgressEntry::done(3, 0),
                ],
            )
            .unwrap();

        assert_eq!(store.done_ids("run").unwrap(), HashSet::from([1, 3]));
        assert!(store.contains_done("run", 1).unwrap());
        assert!(!store.contains_done("run", 2).unwrap());
        assert!(!store.contains_done("other", 1).unwrap());

        let entries = store.entries("run").unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(entries[1].entry.outcome, Outcome::Failed);
        assert_eq!(entries[2].entry.shard_id, Some(0));
    }

    #[test]
    fn test_counts_prefer_done_over_failed() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store
            .append("run", &[ProgressEntry::failed(1), ProgressEntry::failed(2)])
            .unwrap();
        // A later run retried id 1 successfully.
        store.append("run", &[ProgressEntry::done(1, 4)]).unwrap();

        let counts = store.counts("run").unwrap();
        assert_eq!(counts, LedgerCounts { done: 1, failed: 1 });
    }

    #[test]
    fn test_runs_are_isolated() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store.append("a", &[ProgressEntry::done(1, 0)]).unwrap();
        store.append("b", &[ProgressEntry::done(2, 0)]).unwrap();
        assert_eq!(store.done_ids("a").unwrap(), HashSet::from([1]));
        assert_eq!(store.counts("b").unwrap().done, 1);
    }

    #[test]
    fn test_fingerprint_round_trip() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        assert!(store.run_info("run").unwrap().is_none());

        store.set_fingerprint("run", "abc").unwrap();
        store.append("run", &[ProgressEntry::done(0, 0)]).unwrap();

        let info = store.run_info("run").unwrap().unwrap();
        assert_eq!(info.input_fingerprint.as_deref(), Some("abc"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_progress.sqlite");
        {
            let store = SqliteLedgerStore::new(&path).unwrap();
            store.append("run", &[ProgressEntry::done(7, 1)]).unwrap();
        }
        let store = SqliteLedgerStore::new(&path).unwrap();
        assert!(store.contains_done("run", 7).unwrap());
    }
}
