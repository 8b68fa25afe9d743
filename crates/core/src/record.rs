//! Record types flowing through the pipeline.
//!
//! A [`Record`] is created by the source reader, moved into a fetch worker,
//! then into a shard writer. It is never shared between tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fetcher::FetchErrorKind;

/// Lifecycle of a single input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Read from the source, not yet handed to a worker.
    Pending,
    /// A fetch is currently running for this record.
    InFlight,
    /// Fetched and converted; payload is present.
    Done,
    /// Fetch or conversion failed; error is present.
    Failed,
    /// Persisted in a sealed shard.
    Written,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Written => "written",
        }
    }
}

/// Details extracted from a converted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// PDF header version, e.g. "1.7".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_version: Option<String>,
    /// Number of page objects found in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Title from the document info dictionary, when it is a literal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Converted content ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// File extension used for the payload member inside a shard (no dot).
    pub extension: String,
    pub md5: Option<String>,
    pub document: DocumentInfo,
}

impl Payload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A classified failure attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    pub message: String,
}

/// One input row and everything the pipeline learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Zero-based row index in the input file.
    pub id: u64,
    pub url: String,
    pub caption: String,
    /// Values of the configured additional columns.
    pub extra: BTreeMap<String, String>,
    pub status: RecordStatus,
    pub payload: Option<Payload>,
    pub error: Option<FetchFailure>,
}

impl Record {
    /// Creates a pending record.
    pub fn new(id: u64, url: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            caption: caption.into(),
            extra: BTreeMap::new(),
            status: RecordStatus::Pending,
            payload: None,
            error: None,
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    /// Zero-padded key used for member names inside shards.
    pub fn key(&self) -> String {
        record_key(self.id)
    }

    pub fn mark_in_flight(&mut self) {
        self.status = RecordStatus::InFlight;
    }

    pub fn mark_done(&mut self, payload: Payload) {
        self.status = RecordStatus::Done;
        self.payload = Some(payload);
        self.error = None;
    }

    pub fn mark_failed(&mut self, kind: FetchErrorKind, message: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.payload = None;
        self.error = Some(FetchFailure {
            kind,
            message: message.into(),
        });
    }

    /// The payload now lives in a durable shard, so the in-memory copy is released.
    pub fn mark_written(&mut self) {
        self.status = RecordStatus::Written;
        self.payload = None;
    }

    /// Bytes this record contributes to a shard.
    pub fn payload_size(&self) -> usize {
        self.payload.as_ref().map(Payload::len).unwrap_or(0)
    }
}

/// Formats a record id as a shard member key.
pub fn record_key(id: u64) -> String {
    format!("{:09}", id)
}
