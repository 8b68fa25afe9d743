//! Configuration for shard output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Container format of a sealed shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One directory per shard with loose member files.
    #[default]
    Files,
    /// One WebDataset-style tar archive per shard.
    Tar,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Tar => "tar",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" => Ok(Self::Files),
            "tar" | "webdataset" => Ok(Self::Tar),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Output folder and shard sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Folder receiving shards, markers, the ledger and run reports.
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// A shard is sealed once it holds this many records.
    #[serde(default = "default_number_sample_per_shard")]
    pub number_sample_per_shard: usize,

    /// A shard is sealed once its payloads reach this many bytes.
    #[serde(default = "default_max_shard_bytes")]
    pub max_shard_bytes: u64,

    /// Write attempts per shard before the worker gives up.
    #[serde(default = "default_flush_attempts")]
    pub flush_attempts: u32,
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("dataset")
}

fn default_number_sample_per_shard() -> usize {
    10_000
}

fn default_max_shard_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_flush_attempts() -> u32 {
    3
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            output_format: OutputFormat::default(),
            number_sample_per_shard: default_number_sample_per_shard(),
            max_shard_bytes: default_max_shard_bytes(),
            flush_attempts: default_flush_attempts(),
        }
    }
}
