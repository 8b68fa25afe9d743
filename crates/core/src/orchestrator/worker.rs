//! One supervised worker: a fetch pool feeding its own shard writer.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::abort::AbortSignal;
use crate::fetcher::{FetchWorkerPool, PoolReport};
use crate::record::{Record, RecordStatus};
use crate::shard::{Shard, ShardWriter};

use super::types::{WorkerError, WorkerEvent};

/// Everything a worker owns for one attempt.
pub(crate) struct Worker {
    pub index: usize,
    pub pool: FetchWorkerPool,
    pub writer: ShardWriter,
    pub abort: AbortSignal,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Worker {
    /// Fetches `records`, seals shards as they fill and reports every outcome.
    ///
    /// Done records reach the orchestrator only through `ShardFlushed`, after the
    /// shard and its marker are durable. On error, records accumulated in the
    /// open shard are dropped; they were never reported, so a restart refetches them.
    pub async fn run<I>(mut self, records: I) -> Result<PoolReport, WorkerError>
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        debug!(worker = self.index, "Worker started");
        let (mut completed, handle) = self.pool.run(records, self.abort.clone());
        let _pool = PoolGuard(handle.abort_handle());

        while let Some(record) = completed.recv().await {
            match record.status {
                RecordStatus::Done => {
                    self.writer.accept(record);
                    if let Some(shard) = self.writer.seal_if_full() {
                        self.flush(shard).await?;
                    }
                }
                RecordStatus::Failed => self.send(WorkerEvent::RecordFailed {
                    worker: self.index,
                    record,
                }),
                other => warn!(
                    worker = self.index,
                    record_id = record.id,
                    status = other.as_str(),
                    "Pool returned an unfinished record"
                ),
            }
        }

        let report = handle
            .await
            .map_err(|e| WorkerError::Crash(format!("fetch pool stopped: {}", e)))?;

        self.send(WorkerEvent::Draining { worker: self.index });
        if let Some(shard) = self.writer.seal() {
            self.flush(shard).await?;
        }

        info!(
            worker = self.index,
            completed = report.completed,
            abandoned = report.abandoned,
            aborted = report.aborted,
            "Worker finished"
        );
        Ok(report)
    }

    async fn flush(&self, shard: Shard) -> Result<(), WorkerError> {
        let flushed = self.writer.flush(shard).await?;
        self.send(WorkerEvent::ShardFlushed {
            worker: self.index,
            flushed,
        });
        Ok(())
    }

    fn send(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            debug!(worker = self.index, "Event loop closed, dropping worker event");
        }
    }
}

/// Stops the fetch pool when the worker exits early, including on panic, so a
/// restarted worker never races the old pool for the same ids.
struct PoolGuard(tokio::task::AbortHandle);

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
