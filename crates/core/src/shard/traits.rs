//! Trait definitions for the shard module.

use std::path::Path;

use super::config::OutputFormat;
use super::error::ShardError;
use super::types::{Shard, ShardHandle};

/// Persists a sealed shard into the output folder.
///
/// Writes are blocking; the shard writer runs them on the blocking thread pool.
/// Implementations must leave either a complete shard or nothing visible under
/// the final name.
pub trait ShardSink: Send + Sync {
    /// Returns the name of this sink implementation.
    fn name(&self) -> &str;

    /// The container format this sink produces.
    fn format(&self) -> OutputFormat;

    /// Writes every record of the shard and returns where it landed.
    fn write(&self, shard: &Shard, output_dir: &Path) -> Result<ShardHandle, ShardError>;
}
