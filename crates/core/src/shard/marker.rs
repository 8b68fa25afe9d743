//! Shard commit markers and output folder scanning.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::error::ShardError;
use super::storage::write_atomic;
use super::types::{shard_name, stats_file_name, ShardStats};

const STATS_SUFFIX: &str = "_stats.json";

/// Persists the commit marker of a flushed shard.
pub fn write_stats(output_dir: &Path, stats: &ShardStats) -> Result<PathBuf, ShardError> {
    let path = output_dir.join(stats_file_name(stats.shard_id));
    let bytes =
        serde_json::to_vec_pretty(stats).map_err(|e| ShardError::serialization(&path, e))?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

/// Reads every commit marker in the folder, ordered by shard id.
pub fn read_stats(output_dir: &Path) -> Result<Vec<ShardStats>, ShardError> {
    Ok(scan_output(output_dir)?.committed)
}

/// What a previous run left in the output folder.
#[derive(Debug, Default)]
pub struct OutputScan {
    /// Shards with a commit marker, ordered by shard id.
    pub committed: Vec<ShardStats>,
    /// Shard content or temp files without a commit marker.
    pub orphans: Vec<PathBuf>,
    /// First shard id not used by anything on disk.
    pub next_shard_id: u64,
}

impl OutputScan {
    /// Deletes every orphan. Returns how many were removed.
    pub fn remove_orphans(&self) -> Result<usize, ShardError> {
        for path in &self.orphans {
            let result = if path.is_dir() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match result {
                Ok(()) => warn!(path = %path.display(), "Removed incomplete shard"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ShardError::io(path, e)),
            }
        }
        Ok(self.orphans.len())
    }
}

/// Classifies the entries of an output folder. A missing folder scans as empty.
pub fn scan_output(output_dir: &Path) -> Result<OutputScan, ShardError> {
    let mut scan = OutputScan::default();
    if !output_dir.exists() {
        return Ok(scan);
    }

    let entries = fs::read_dir(output_dir).map_err(|e| ShardError::io(output_dir, e))?;
    let mut content: Vec<(u64, PathBuf)> = Vec::new();
    let mut max_id: Option<u64> = None;

    for entry in entries {
        let entry = entry.map_err(|e| ShardError::io(output_dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if let Some(id) = name.strip_suffix(STATS_SUFFIX).and_then(parse_shard_id) {
            let bytes = fs::read(&path).map_err(|e| ShardError::io(&path, e))?;
            match serde_json::from_slice::<ShardStats>(&bytes) {
                Ok(stats) => scan.committed.push(stats),
                Err(e) => {
                    // A marker is written atomically, so this is foreign or corrupted.
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable shard marker");
                    continue;
                }
            }
            max_id = max_id.max(Some(id));
            continue;
        }

        if let Some(id) = shard_id_of_content(&name) {
            max_id = max_id.max(Some(id));
            if name.ends_with(".tmp") {
                scan.orphans.push(path);
            } else {
                content.push((id, path));
            }
        }
    }

    scan.committed.sort_by_key(|s| s.shard_id);
    for (id, path) in content {
        if scan.committed.binary_search_by_key(&id, |s| s.shard_id).is_err() {
            scan.orphans.push(path);
        }
    }
    scan.orphans.sort();
    scan.next_shard_id = max_id.map(|id| id + 1).unwrap_or(0);

    if !scan.committed.is_empty() || !scan.orphans.is_empty() {
        info!(
            committed = scan.committed.len(),
            orphans = scan.orphans.len(),
            next_shard_id = scan.next_shard_id,
            "Scanned existing output"
        );
    }

    Ok(scan)
}

/// Accepts only names produced by [`shard_name`], so `2024` or `7` are not shards.
fn parse_shard_id(stem: &str) -> Option<u64> {
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = stem.parse().ok()?;
    (shard_name(id) == stem).then_some(id)
}

/// Shard id of `00003`, `00003.tar`, `00003.tmp`, `00003.tar.tmp` or `00003_stats.json.tmp`.
fn shard_id_of_content(name: &str) -> Option<u64> {
    let name = name.strip_suffix(".tmp").unwrap_or(name);
    let stem = name
        .strip_suffix(".tar")
        .or_else(|| name.strip_suffix(STATS_SUFFIX))
        .unwrap_or(name);
    parse_shard_id(stem)
}
