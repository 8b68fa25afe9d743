//! Durable file helpers shared by the sinks and the commit markers.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::record::Record;

use super::error::ShardError;
use super::types::RecordMeta;

/// Writes `bytes` to `path` and fsyncs the file.
pub(crate) fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), ShardError> {
    let mut file = File::create(path).map_err(|e| ShardError::io(path, e))?;
    file.write_all(bytes).map_err(|e| ShardError::io(path, e))?;
    file.sync_all().map_err(|e| ShardError::io(path, e))
}

/// Fsyncs a directory so renames inside it survive a crash.
#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> Result<(), ShardError> {
    File::open(path)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| ShardError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> Result<(), ShardError> {
    Ok(())
}

/// Writes to a temporary sibling, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ShardError> {
    let tmp = path.with_extension(tmp_extension(path));
    write_synced(&tmp, bytes)?;
    fs::rename(&tmp, path).map_err(|e| ShardError::io(path, e))?;
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
        _ => Ok(()),
    }
}

fn tmp_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    }
}

/// Members stored for one record: payload, caption and metadata.
pub(crate) fn record_members(
    record: &Record,
    shard_path: &Path,
) -> Result<Vec<(String, Vec<u8>)>, ShardError> {
    let key = record.key();
    let mut members = Vec::with_capacity(3);

    if let Some(payload) = &record.payload {
        members.push((format!("{}.{}", key, payload.extension), payload.bytes.clone()));
    }
    members.push((format!("{}.txt", key), record.caption.clone().into_bytes()));

    let meta = serde_json::to_vec(&RecordMeta::from_record(record))
        .map_err(|e| ShardError::serialization(shard_path, e))?;
    members.push((format!("{}.json", key), meta));

    Ok(members)
}
