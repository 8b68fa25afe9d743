//! Bounded concurrent fetch pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::abort::AbortSignal;
use crate::converter::Converter;
use crate::metrics;
use crate::record::{Record, RecordStatus};

use super::traits::Fetcher;
use super::types::{FetchErrorKind, PoolReport};

/// Runs up to `thread_count` fetches at a time for one worker.
///
/// Completed records (done or failed) are streamed back through a bounded
/// channel, so a slow consumer stops the pool from starting new fetches.
#[derive(Clone)]
pub struct FetchWorkerPool {
    thread_count: usize,
    fetch_timeout: Duration,
    grace_period: Duration,
    fetcher: Arc<dyn Fetcher>,
    converter: Arc<dyn Converter>,
    label: String,
}

impl FetchWorkerPool {
    /// Creates a pool. `thread_count` is clamped to at least one.
    pub fn new(
        thread_count: usize,
        fetcher: Arc<dyn Fetcher>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            thread_count: thread_count.max(1),
            fetch_timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
            fetcher,
            converter,
            label: "pool".to_string(),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// How long in-flight fetches may keep running after an abort.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Starts fetching `records` in the background.
    ///
    /// The receiver yields every record that finished; it closes once the input
    /// is exhausted and all in-flight fetches have drained, or after an abort.
    /// The join handle resolves to a report of what happened.
    pub fn run<I>(
        &self,
        records: I,
        abort: AbortSignal,
    ) -> (mpsc::Receiver<Record>, JoinHandle<PoolReport>)
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.thread_count * 2);
        let pool = self.clone();
        let records = records.into_iter();
        let handle = tokio::spawn(async move { pool.drive(records, tx, abort).await });
        (rx, handle)
    }

    async fn drive<I>(
        self,
        mut records: I,
        tx: mpsc::Sender<Record>,
        mut abort: AbortSignal,
    ) -> PoolReport
    where
        I: Iterator<Item = Record>,
    {
        let mut in_flight = FuturesUnordered::new();
        let mut in_flight_ids: HashSet<u64> = HashSet::new();
        let mut report = PoolReport::default();
        let mut exhausted = false;

        loop {
            while !exhausted && !abort.is_aborted() && in_flight.len() < self.thread_count {
                match records.next() {
                    Some(mut record) => {
                        if !in_flight_ids.insert(record.id) {
                            warn!(
                                pool = %self.label,
                                record_id = record.id,
                                "Record already in flight, skipping duplicate"
                            );
                            continue;
                        }
                        record.mark_in_flight();
                        in_flight.push(fetch_one(
                            record,
                            Arc::clone(&self.fetcher),
                            Arc::clone(&self.converter),
                            self.fetch_timeout,
                        ));
                    }
                    None => exhausted = true,
                }
            }

            if in_flight.is_empty() {
                break;
            }

            if abort.is_aborted() {
                report.aborted = true;
                break;
            }

            tokio::select! {
                Some(record) = in_flight.next() => {
                    in_flight_ids.remove(&record.id);
                    report.completed += 1;
                    if tx.send(record).await.is_err() {
                        debug!(pool = %self.label, "Receiver dropped, stopping pool");
                        return report;
                    }
                }
                _ = abort.aborted() => {}
            }
        }

        if report.aborted || abort.is_aborted() {
            report.aborted = true;
            info!(
                pool = %self.label,
                in_flight = in_flight.len(),
                grace_ms = self.grace_period.as_millis() as u64,
                "Abort requested, draining in-flight fetches"
            );

            let deadline = tokio::time::Instant::now() + self.grace_period;
            loop {
                match tokio::time::timeout_at(deadline, in_flight.next()).await {
                    Ok(Some(record)) => {
                        in_flight_ids.remove(&record.id);
                        report.completed += 1;
                        if tx.send(record).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        report.abandoned = in_flight.len();
                        warn!(
                            pool = %self.label,
                            abandoned = report.abandoned,
                            "Grace period expired, abandoning in-flight fetches"
                        );
                        break;
                    }
                }
            }
        }

        report
    }
}

async fn fetch_one(
    mut record: Record,
    fetcher: Arc<dyn Fetcher>,
    converter: Arc<dyn Converter>,
    timeout: Duration,
) -> Record {
    let started = Instant::now();

    let result = tokio::time::timeout(timeout, fetcher.fetch(&record.url)).await;
    let fetched = match result {
        Ok(Ok(content)) => content,
        Ok(Err(e)) => {
            record.mark_failed(e.kind, e.message);
            observe(&record, started);
            return record;
        }
        Err(_) => {
            record.mark_failed(
                FetchErrorKind::Timeout,
                format!("fetch timed out after {} ms", timeout.as_millis()),
            );
            observe(&record, started);
            return record;
        }
    };

    metrics::BYTES_FETCHED.inc_by(fetched.bytes.len() as u64);

    match tokio::task::spawn_blocking(move || converter.convert(fetched)).await {
        Ok(Ok(payload)) => record.mark_done(payload),
        Ok(Err(e)) => record.mark_failed(FetchErrorKind::ConversionError, e.to_string()),
        Err(e) => record.mark_failed(
            FetchErrorKind::ConversionError,
            format!("converter task failed: {}", e),
        ),
    }

    observe(&record, started);
    record
}

fn observe(record: &Record, started: Instant) {
    let result = match (&record.status, &record.error) {
        (RecordStatus::Done, _) => "success",
        (_, Some(failure)) => failure.kind.label(),
        _ => "unknown",
    };
    metrics::FETCH_RESULTS.with_label_values(&[result]).inc();
    metrics::FETCH_DURATION
        .with_label_values(&[result])
        .observe(started.elapsed().as_secs_f64());

    if let Some(failure) = &record.error {
        debug!(
            record_id = record.id,
            url = %record.url,
            kind = failure.kind.label(),
            error = %failure.message,
            "Fetch failed"
        );
    }
}
