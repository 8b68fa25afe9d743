//! Types for the shard module.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{DocumentInfo, Record};

use super::config::OutputFormat;

/// Directory or archive stem of a shard.
pub fn shard_name(shard_id: u64) -> String {
    format!("{:05}", shard_id)
}

/// File name of a shard's commit marker.
pub fn stats_file_name(shard_id: u64) -> String {
    format!("{}_stats.json", shard_name(shard_id))
}

/// A sealed batch of completed records, ready to be persisted.
#[derive(Debug, Clone)]
pub struct Shard {
    pub shard_id: u64,
    /// Records in completion order.
    pub records: Vec<Record>,
    /// Sum of payload sizes.
    pub byte_size: u64,
    pub opened_at: DateTime<Utc>,
    pub sealed_at: DateTime<Utc>,
}

impl Shard {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_ids(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.id).collect()
    }
}

/// Where and how a shard was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardHandle {
    pub shard_id: u64,
    /// Shard directory or archive.
    pub path: PathBuf,
    pub format: OutputFormat,
    pub count: usize,
    pub byte_size: u64,
}

/// Commit marker written next to a shard once it is durable.
///
/// A shard without a marker is incomplete and is removed on the next start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    pub shard_id: u64,
    pub format: OutputFormat,
    pub count: usize,
    pub byte_size: u64,
    pub record_ids: Vec<u64>,
    pub opened_at: DateTime<Utc>,
    pub sealed_at: DateTime<Utc>,
    pub flushed_at: DateTime<Utc>,
    /// Time from the first accepted record to the marker write.
    pub duration_ms: i64,
}

impl ShardStats {
    pub fn new(shard: &Shard, handle: &ShardHandle, flushed_at: DateTime<Utc>) -> Self {
        Self {
            shard_id: shard.shard_id,
            format: handle.format,
            count: shard.len(),
            byte_size: shard.byte_size,
            record_ids: shard.record_ids(),
            opened_at: shard.opened_at,
            sealed_at: shard.sealed_at,
            flushed_at,
            duration_ms: (flushed_at - shard.opened_at).num_milliseconds(),
        }
    }
}

/// A shard that is durable on disk together with its commit marker.
#[derive(Debug, Clone)]
pub struct FlushedShard {
    pub handle: ShardHandle,
    pub stats: ShardStats,
    /// The shard's records, now `Written` and without payload bytes.
    pub records: Vec<Record>,
}

/// Field names of [`RecordMeta`]. Additional input columns are flattened next
/// to them and must not reuse one.
pub const RESERVED_META_KEYS: &[&str] = &[
    "key",
    "id",
    "url",
    "caption",
    "status",
    "content_type",
    "md5",
    "size",
    "document",
];

/// Per-record metadata stored as the `{key}.json` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub key: String,
    pub id: u64,
    pub url: String,
    pub caption: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    pub size: usize,
    #[serde(default)]
    pub document: DocumentInfo,
    /// Additional input columns.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl RecordMeta {
    pub fn from_record(record: &Record) -> Self {
        let payload = record.payload.as_ref();
        Self {
            key: record.key(),
            id: record.id,
            url: record.url.clone(),
            caption: record.caption.clone(),
            status: "success".to_string(),
            content_type: payload.and_then(|p| p.content_type.clone()),
            md5: payload.and_then(|p| p.md5.clone()),
            size: record.payload_size(),
            document: payload.map(|p| p.document.clone()).unwrap_or_default(),
            extra: record.extra.clone(),
        }
    }
}

/// Hands out shard ids that are unique across all workers of a run.
#[derive(Debug, Clone, Default)]
pub struct ShardIdAllocator {
    next: Arc<AtomicU64>,
}

impl ShardIdAllocator {
    /// Starts allocating at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next call to `allocate` returns.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
