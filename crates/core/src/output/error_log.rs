//! JSON-lines log of failed records.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::fetcher::FetchErrorKind;
use crate::record::Record;
use crate::shard::write_atomic;

use super::OutputError;

/// File name of the error log inside the output folder.
pub const ERROR_LOG_FILE: &str = "errors.jsonl";

/// One line of the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub record_id: u64,
    pub key: String,
    pub url: String,
    pub caption: String,
    pub kind: FetchErrorKind,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorEntry {
    /// Builds an entry from a failed record. `None` if the record has no error.
    pub fn from_record(record: &Record) -> Option<Self> {
        let failure = record.error.as_ref()?;
        Some(Self {
            record_id: record.id,
            key: record.key(),
            url: record.url.clone(),
            caption: record.caption.clone(),
            kind: failure.kind,
            message: failure.message.clone(),
            recorded_at: Utc::now(),
        })
    }
}

/// Append-only writer for `errors.jsonl`.
///
/// Each line is synced before `append` returns, so a failed id is logged
/// before the ledger records it.
pub struct ErrorLog {
    path: PathBuf,
    file: File,
    written: u64,
}

impl ErrorLog {
    /// Opens the log in `output_dir` for appending. Earlier runs' lines are kept.
    pub async fn open(output_dir: &Path) -> Result<Self, OutputError> {
        let path = output_dir.join(ERROR_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| OutputError::io(&path, e))?;
        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written by this writer.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn append(&mut self, entry: &ErrorEntry) -> Result<(), OutputError> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| OutputError::serialization(&self.path, e))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .await
            .map_err(|e| OutputError::io(&self.path, e))?;
        self.file
            .sync_data()
            .await
            .map_err(|e| OutputError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }
}

/// Reads every entry of an error log. A missing file reads as empty.
pub fn read_error_log(path: &Path) -> Result<Vec<ErrorEntry>, OutputError> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(OutputError::io(path, e)),
    };
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| OutputError::serialization(path, e)))
        .collect()
}

/// Rewrites the log so it lists each still-failed id once.
///
/// A resumed run retries earlier failures and appends fresh entries, so the
/// latest entry per id wins and ids in `done` are dropped. Returns the number
/// of entries kept.
pub fn compact_error_log(path: &Path, done: &HashSet<u64>) -> Result<usize, OutputError> {
    let entries = read_error_log(path)?;
    let total = entries.len();

    let mut latest: BTreeMap<u64, ErrorEntry> = BTreeMap::new();
    for entry in entries {
        if !done.contains(&entry.record_id) {
            latest.insert(entry.record_id, entry);
        }
    }
    if latest.len() == total {
        return Ok(total);
    }

    let mut body = Vec::new();
    for entry in latest.values() {
        serde_json::to_writer(&mut body, entry).map_err(|e| OutputError::serialization(path, e))?;
        body.push(b'\n');
    }
    write_atomic(path, &body)?;
    debug!(
        path = %path.display(),
        before = total,
        after = latest.len(),
        "Compacted error log"
    );
    Ok(latest.len())
}
