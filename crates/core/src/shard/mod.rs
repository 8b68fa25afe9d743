//! Shard module for persisting completed records.
//!
//! Each worker owns a [`ShardWriter`] that groups completed records into
//! shards and hands sealed shards to a [`ShardSink`]:
//! - [`FilesSink`]: one directory per shard
//! - [`TarSink`]: one WebDataset-style tar per shard
//!
//! A shard counts as committed only once its `{shard:05}_stats.json` marker
//! exists. [`scan_output`] finds committed shards and the leftovers of an
//! interrupted flush.

mod archive;
mod config;
mod error;
mod files;
mod marker;
mod storage;
mod traits;
mod types;
mod writer;

use std::sync::Arc;

pub use archive::TarSink;
pub use config::{OutputConfig, OutputFormat};
pub use error::ShardError;
pub use files::FilesSink;
pub use marker::{read_stats, scan_output, write_stats, OutputScan};
pub use traits::ShardSink;
pub use types::{
    shard_name, stats_file_name, FlushedShard, RecordMeta, Shard, ShardHandle, ShardIdAllocator,
    ShardStats, RESERVED_META_KEYS,
};
pub use writer::ShardWriter;

pub(crate) use storage::write_atomic;

/// Builds the sink for an output format.
pub fn create_sink(format: OutputFormat) -> Arc<dyn ShardSink> {
    match format {
        OutputFormat::Files => Arc::new(FilesSink::new()),
        OutputFormat::Tar => Arc::new(TarSink::new()),
    }
}
