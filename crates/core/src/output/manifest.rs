//! Dataset manifest rebuilt from shard commit markers.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shard::{shard_name, OutputFormat, ShardStats};

use super::{write_json, OutputError};

/// File name of the manifest inside the output folder.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestShard {
    pub shard_id: u64,
    /// Shard path relative to the output folder.
    pub path: String,
    pub format: OutputFormat,
    pub count: usize,
    pub byte_size: u64,
}

/// Every committed shard of the output folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub shard_count: usize,
    pub total_records: usize,
    pub total_bytes: u64,
    pub shards: Vec<ManifestShard>,
}

impl Manifest {
    /// Builds a manifest from commit markers, ordered by shard id.
    pub fn from_stats(stats: &[ShardStats]) -> Self {
        let mut shards: Vec<ManifestShard> = stats
            .iter()
            .map(|s| ManifestShard {
                shard_id: s.shard_id,
                path: match s.format {
                    OutputFormat::Files => shard_name(s.shard_id),
                    OutputFormat::Tar => format!("{}.tar", shard_name(s.shard_id)),
                },
                format: s.format,
                count: s.count,
                byte_size: s.byte_size,
            })
            .collect();
        shards.sort_by_key(|s| s.shard_id);

        Self {
            generated_at: Utc::now(),
            shard_count: shards.len(),
            total_records: shards.iter().map(|s| s.count).sum(),
            total_bytes: shards.iter().map(|s| s.byte_size).sum(),
            shards,
        }
    }

    /// Replaces `manifest.json` in `output_dir`.
    pub fn write(&self, output_dir: &Path) -> Result<(), OutputError> {
        write_json(&output_dir.join(MANIFEST_FILE), self)
    }
}
