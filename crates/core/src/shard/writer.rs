//! Per-worker shard accumulator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::record::{Record, RecordStatus};

use super::config::OutputConfig;
use super::error::ShardError;
use super::marker::write_stats;
use super::traits::ShardSink;
use super::types::{FlushedShard, Shard, ShardIdAllocator, ShardStats};

/// Accumulates completed records for one worker and persists them in shards.
///
/// Only the owning worker touches a writer. Shard ids come from the
/// run-wide [`ShardIdAllocator`], so names never collide across workers.
pub struct ShardWriter {
    worker: usize,
    output_dir: PathBuf,
    max_records: usize,
    max_bytes: u64,
    flush_attempts: u32,
    retry_delay: Duration,
    sink: Arc<dyn ShardSink>,
    allocator: ShardIdAllocator,
    records: Vec<Record>,
    byte_size: u64,
    opened_at: Option<DateTime<Utc>>,
}

impl ShardWriter {
    pub fn new(
        config: &OutputConfig,
        sink: Arc<dyn ShardSink>,
        allocator: ShardIdAllocator,
    ) -> Self {
        Self {
            worker: 0,
            output_dir: config.output_folder.clone(),
            max_records: config.number_sample_per_shard.max(1),
            max_bytes: config.max_shard_bytes.max(1),
            flush_attempts: config.flush_attempts.max(1),
            retry_delay: Duration::from_millis(100),
            sink,
            allocator,
            records: Vec::new(),
            byte_size: 0,
            opened_at: None,
        }
    }

    /// Tags log lines with the owning worker.
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = worker;
        self
    }

    /// Base delay between flush attempts; grows linearly per attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Adds a completed record to the open shard.
    ///
    /// Records that are not `Done` never enter a shard and are dropped here.
    pub fn accept(&mut self, record: Record) {
        if record.status != RecordStatus::Done {
            warn!(
                worker = self.worker,
                record_id = record.id,
                status = record.status.as_str(),
                "Refusing non-done record"
            );
            return;
        }
        if self.opened_at.is_none() {
            self.opened_at = Some(Utc::now());
        }
        self.byte_size += record.payload_size() as u64;
        self.records.push(record);
    }

    /// Whether the open shard reached the record or byte threshold.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_records || self.byte_size >= self.max_bytes
    }

    pub fn pending_len(&self) -> usize {
        self.records.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.byte_size
    }

    /// Closes the open shard, assigning it a fresh id. `None` when nothing is pending.
    pub fn seal(&mut self) -> Option<Shard> {
        if self.records.is_empty() {
            return None;
        }

        let shard = Shard {
            shard_id: self.allocator.allocate(),
            records: std::mem::take(&mut self.records),
            byte_size: std::mem::replace(&mut self.byte_size, 0),
            opened_at: self.opened_at.take().unwrap_or_else(Utc::now),
            sealed_at: Utc::now(),
        };

        debug!(
            worker = self.worker,
            shard_id = shard.shard_id,
            records = shard.len(),
            bytes = shard.byte_size,
            "Sealed shard"
        );
        Some(shard)
    }

    /// Seals only when the threshold was crossed.
    pub fn seal_if_full(&mut self) -> Option<Shard> {
        if self.is_full() {
            self.seal()
        } else {
            None
        }
    }

    /// Persists a sealed shard and then its commit marker.
    ///
    /// Each step is attempted up to `flush_attempts` times on the same path.
    /// The last error is returned when the budget runs out.
    pub async fn flush(&self, shard: Shard) -> Result<FlushedShard, ShardError> {
        let shard = Arc::new(shard);

        let handle = {
            let sink = Arc::clone(&self.sink);
            let shard = Arc::clone(&shard);
            let dir = self.output_dir.clone();
            self.with_attempts(shard.shard_id, "write", move || sink.write(&shard, &dir))
                .await?
        };

        let stats = ShardStats::new(&shard, &handle, Utc::now());
        {
            let stats = stats.clone();
            let dir = self.output_dir.clone();
            self.with_attempts(shard.shard_id, "marker", move || write_stats(&dir, &stats))
                .await?;
        }

        metrics::SHARDS_WRITTEN
            .with_label_values(&[handle.format.as_str()])
            .inc();
        info!(
            worker = self.worker,
            shard_id = handle.shard_id,
            records = handle.count,
            bytes = handle.byte_size,
            path = %handle.path.display(),
            "Shard flushed"
        );

        let mut records = match Arc::try_unwrap(shard) {
            Ok(shard) => shard.records,
            Err(shared) => shared.records.clone(),
        };
        records.iter_mut().for_each(Record::mark_written);

        Ok(FlushedShard {
            handle,
            stats,
            records,
        })
    }

    async fn with_attempts<T, F>(&self, shard_id: u64, step: &str, op: F) -> Result<T, ShardError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, ShardError> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut attempt = 1;
        loop {
            let task = Arc::clone(&op);
            let result = tokio::task::spawn_blocking(move || task())
                .await
                .unwrap_or_else(|e| Err(ShardError::TaskFailed(e.to_string())));

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.flush_attempts => {
                    warn!(
                        worker = self.worker,
                        shard_id,
                        step,
                        attempt,
                        error = %e,
                        "Shard flush failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocumentInfo, Payload};
    use crate::shard::{read_stats, FilesSink};
    use crate::testing::FailingSink;
    use tempfile::TempDir;

    fn done(id: u64, size: usize) -> Record {
        let mut record = Record::new(id, format!("https://example.com/{}.pdf", id), "c");
        record.mark_done(Payload {
            bytes: vec![b'x'; size],
            content_type: None,
            extension: "pdf".to_string(),
            md5: None,
            document: DocumentInfo::default(),
        });
        record
    }

    fn config(dir: &TempDir, max_records: usize, max_bytes: u64) -> OutputConfig {
        OutputConfig {
            output_folder: dir.path().to_path_buf(),
            number_sample_per_shard: max_records,
            max_shard_bytes: max_bytes,
            ..Default::default()
        }
    }

    fn writer(config: &OutputConfig, sink: Arc<dyn ShardSink>) -> ShardWriter {
        ShardWriter::new(config, sink, ShardIdAllocator::default())
            .with_retry_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_full_by_count() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&config(&dir, 2, 1 << 20), Arc::new(FilesSink::new()));

        writer.accept(done(0, 10));
        assert!(!writer.is_full());
        assert!(writer.seal_if_full().is_none());
        writer.accept(done(1, 10));
        assert!(writer.is_full());

        let shard = writer.seal_if_full().unwrap();
        assert_eq!(shard.record_ids(), vec![0, 1]);
        assert_eq!(shard.byte_size, 20);
        assert_eq!(writer.pending_len(), 0);
        assert_eq!(writer.pending_bytes(), 0);
    }

    #[test]
    fn test_full_by_bytes() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&config(&dir, 100, 50), Arc::new(FilesSink::new()));
        writer.accept(done(0, 30));
        assert!(!writer.is_full());
        writer.accept(done(1, 30));
        assert!(writer.is_full());
    }

    #[test]
    fn test_failed_records_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&config(&dir, 10, 1 << 20), Arc::new(FilesSink::new()));
        let mut failed = Record::new(3, "u", "c");
        failed.mark_failed(crate::fetcher::FetchErrorKind::Timeout, "slow");
        writer.accept(failed);
        assert!(writer.seal().is_none());
    }

    #[test]
    fn test_seal_assigns_increasing_ids() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&config(&dir, 1, 1 << 20), Arc::new(FilesSink::new()));
        writer.accept(done(0, 1));
        let first = writer.seal().unwrap();
        writer.accept(done(1, 1));
        let second = writer.seal().unwrap();
        assert!(second.shard_id > first.shard_id);
    }

    #[tokio::test]
    async fn test_flush_writes_shard_and_marker() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&config(&dir, 10, 1 << 20), Arc::new(FilesSink::new()));
        writer.accept(done(4, 3));
        writer.accept(done(2, 3));

        let sealed = writer.seal().unwrap();

        let flushed = writer.flush(sealed).await.unwrap();
        assert_eq!(flushed.stats.record_ids, vec![4, 2]);
        assert!(flushed.handle.path.join("000000004.pdf").exists());
        assert_eq!(flushed.records.len(), 2);
        assert!(flushed
            .records
            .iter()
            .all(|r| r.status == RecordStatus::Written && r.payload.is_none()));

        let markers = read_stats(dir.path()).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].count, 2);
    }

    #[tokio::test]
    async fn test_flush_retries_transient_failures() {
        let dir = TempDir::new().unwrap();
        let sink = FailingSink::new(FilesSink::new()).fail_first(2);
        let mut writer = writer(&config(&dir, 10, 1 << 20), Arc::new(sink.clone()));
        writer.accept(done(0, 1));

        let sealed = writer.seal().unwrap();

        writer.flush(sealed).await.unwrap();
        assert_eq!(sink.attempts(), 3);
    }

    #[tokio::test]
    async fn test_flush_gives_up_after_budget() {
        let dir = TempDir::new().unwrap();
        let sink = FailingSink::new(FilesSink::new()).fail_always();
        let mut writer = writer(&config(&dir, 10, 1 << 20), Arc::new(sink.clone()));
        writer.accept(done(0, 1));

        let sealed = writer.seal().unwrap();

        let err = writer.flush(sealed).await.unwrap_err();
        assert!(matches!(err, ShardError::Io { .. }));
        assert_eq!(sink.attempts(), 3);
        assert!(read_stats(dir.path()).unwrap().is_empty());
    }
}
