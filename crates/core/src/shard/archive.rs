//! WebDataset-style tar sink.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use tracing::debug;

use super::config::OutputFormat;
use super::error::ShardError;
use super::storage::{record_members, sync_dir};
use super::traits::ShardSink;
use super::types::{shard_name, Shard, ShardHandle};

/// Writes each shard as `{shard:05}.tar`, members grouped by record key so
/// WebDataset loaders see one sample per key.
#[derive(Debug, Clone, Default)]
pub struct TarSink;

impl TarSink {
    pub fn new() -> Self {
        Self
    }
}

impl ShardSink for TarSink {
    fn name(&self) -> &str {
        "tar"
    }

    fn format(&self) -> OutputFormat {
        OutputFormat::Tar
    }

    fn write(&self, shard: &Shard, output_dir: &Path) -> Result<ShardHandle, ShardError> {
        let name = shard_name(shard.shard_id);
        let final_path = output_dir.join(format!("{}.tar", name));
        if final_path.exists() {
            return Err(ShardError::AlreadyExists {
                shard_id: shard.shard_id,
                path: final_path,
            });
        }

        let tmp_path = output_dir.join(format!("{}.tar.tmp", name));
        let file = File::create(&tmp_path).map_err(|e| ShardError::io(&tmp_path, e))?;
        let mut builder = tar::Builder::new(BufWriter::new(file));
        let mtime = shard.sealed_at.timestamp().max(0) as u64;

        for record in &shard.records {
            for (member, bytes) in record_members(record, &tmp_path)? {
                let mut header = tar::Header::new_gnu();
                header.set_size(bytes.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(mtime);
                header.set_cksum();
                builder
                    .append_data(&mut header, &member, bytes.as_slice())
                    .map_err(|e| ShardError::io(&tmp_path, e))?;
            }
        }

        let writer = builder
            .into_inner()
            .map_err(|e| ShardError::io(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| ShardError::io(&tmp_path, e.into_error()))?;
        file.sync_all().map_err(|e| ShardError::io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &final_path).map_err(|e| ShardError::io(&final_path, e))?;
        sync_dir(output_dir)?;

        debug!(shard_id = shard.shard_id, path = %final_path.display(), "Shard archive committed");

        Ok(ShardHandle {
            shard_id: shard.shard_id,
            path: final_path,
            format: OutputFormat::Tar,
            count: shard.len(),
            byte_size: shard.byte_size,
        })
    }
}
