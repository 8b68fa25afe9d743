//! Directory-per-shard sink.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::config::OutputFormat;
use super::error::ShardError;
use super::storage::{record_members, sync_dir, write_synced};
use super::traits::ShardSink;
use super::types::{shard_name, Shard, ShardHandle};

/// Writes each shard as a directory `{shard:05}/` holding the members of
/// every record.
///
/// Members are written into `{shard:05}.tmp/` and the directory is renamed
/// into place once every file is synced.
#[derive(Debug, Clone, Default)]
pub struct FilesSink;

impl FilesSink {
    pub fn new() -> Self {
        Self
    }
}

impl ShardSink for FilesSink {
    fn name(&self) -> &str {
        "files"
    }

    fn format(&self) -> OutputFormat {
        OutputFormat::Files
    }

    fn write(&self, shard: &Shard, output_dir: &Path) -> Result<ShardHandle, ShardError> {
        let name = shard_name(shard.shard_id);
        let final_path = output_dir.join(&name);
        if final_path.exists() {
            return Err(ShardError::AlreadyExists {
                shard_id: shard.shard_id,
                path: final_path,
            });
        }

        let tmp_path = output_dir.join(format!("{}.tmp", name));
        if tmp_path.exists() {
            fs::remove_dir_all(&tmp_path).map_err(|e| ShardError::io(&tmp_path, e))?;
        }
        fs::create_dir_all(&tmp_path).map_err(|e| ShardError::io(&tmp_path, e))?;

        for record in &shard.records {
            for (member, bytes) in record_members(record, &tmp_path)? {
                write_synced(&tmp_path.join(member), &bytes)?;
            }
        }
        sync_dir(&tmp_path)?;

        fs::rename(&tmp_path, &final_path).map_err(|e| ShardError::io(&final_path, e))?;
        sync_dir(output_dir)?;

        debug!(shard_id = shard.shard_id, path = %final_path.display(), "Shard directory committed");

        Ok(ShardHandle {
            shard_id: shard.shard_id,
            path: final_path,
            format: OutputFormat::Files,
            count: shard.len(),
            byte_size: shard.byte_size,
        })
    }
}
