//! Command-line arguments and how they override the loaded configuration.

use std::path::PathBuf;

use clap::Parser;

use pdfharvest_core::{Config, InputFormat, OutputFormat, RetryConfig};

#[derive(Parser, Debug)]
#[command(name = "pdfharvest")]
#[command(author, version, about = "Download a list of PDF URLs into a sharded, resumable dataset")]
pub struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(long, env = "PDFHARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Input file listing the URLs
    #[arg(long)]
    pub url_list: Option<PathBuf>,

    /// Input format: csv, tsv, jsonl, txt or parquet
    #[arg(long)]
    pub input_format: Option<InputFormat>,

    /// Column holding the URL
    #[arg(long)]
    pub url_col: Option<String>,

    /// Column holding the caption
    #[arg(long)]
    pub caption_col: Option<String>,

    /// Extra columns copied into each record's metadata
    #[arg(long, value_delimiter = ',')]
    pub additional_columns: Option<Vec<String>>,

    /// Output format: files or tar (webdataset)
    #[arg(long)]
    pub output_format: Option<OutputFormat>,

    /// Folder receiving shards; re-running with the same folder resumes
    #[arg(long)]
    pub output_folder: Option<PathBuf>,

    /// Number of workers
    #[arg(long)]
    pub processes_count: Option<usize>,

    /// Concurrent fetches per worker
    #[arg(long)]
    pub thread_count: Option<usize>,

    /// Records per shard
    #[arg(long)]
    pub number_sample_per_shard: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Extra attempts for retryable failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Store an md5 digest of each payload
    #[arg(long)]
    pub compute_md5: Option<bool>,

    /// Write metrics.prom into the output folder
    #[arg(long)]
    pub enable_metrics: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Applies every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.url_list {
            config.input.url_list = path.clone();
        }
        if let Some(format) = self.input_format {
            config.input.input_format = format;
        }
        if let Some(col) = &self.url_col {
            config.input.url_col = col.clone();
        }
        if let Some(col) = &self.caption_col {
            config.input.caption_col = col.clone();
        }
        if let Some(cols) = &self.additional_columns {
            config.input.additional_columns = cols.clone();
        }
        if let Some(format) = self.output_format {
            config.output.output_format = format;
        }
        if let Some(folder) = &self.output_folder {
            config.output.output_folder = folder.clone();
        }
        if let Some(count) = self.processes_count {
            config.fetch.processes_count = count;
        }
        if let Some(count) = self.thread_count {
            config.fetch.thread_count = count;
        }
        if let Some(count) = self.number_sample_per_shard {
            config.output.number_sample_per_shard = count;
        }
        if let Some(secs) = self.timeout {
            config.fetch.timeout_secs = secs;
        }
        if let Some(retries) = self.retries {
            config.retry = RetryConfig {
                max_attempts: retries.saturating_add(1),
                ..config.retry.clone()
            };
        }
        if let Some(md5) = self.compute_md5 {
            config.converter.compute_md5 = md5;
        }
        if self.enable_metrics {
            config.metrics.enabled = true;
        }
    }
}
