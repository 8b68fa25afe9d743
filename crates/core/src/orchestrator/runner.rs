//! Run orchestrator implementation.
//!
//! Drives one run over an output folder through its state machine:
//! - Partitioning: reconcile the folder with the ledger, validate the input
//! - Running: one supervised worker per partition, restarted on failure
//! - Draining: workers seal and flush their last shard
//!
//! The event loop is the only writer of the ledger and the error log.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::abort::AbortHandle;
use crate::config::Config;
use crate::converter::{create_converter, Converter};
use crate::fetcher::{FetchWorkerPool, Fetcher, HttpFetcher, PoolReport};
use crate::ledger::{Outcome, ProgressEntry, ProgressLedger};
use crate::metrics;
use crate::output::{
    compact_error_log, write_json, write_text, ErrorEntry, ErrorLog, Manifest, OutputError,
    METRICS_FILE, SUMMARY_FILE,
};
use crate::record::Record;
use crate::shard::{
    create_sink, read_stats, scan_output, OutputScan, ShardIdAllocator, ShardSink, ShardWriter,
};
use crate::source::{SourceReader, SourceRecords};

use super::partition::Partitioner;
use super::retry::RetryingFetcher;
use super::types::{
    OrchestratorError, OrchestratorState, RunProgress, RunSummary, WorkerError, WorkerEvent,
};
use super::worker::Worker;

type WorkerResult = (usize, Result<PoolReport, WorkerError>);

/// Fetches every record of the input into the output folder.
///
/// One orchestrator drives one run; create a new one to resume.
pub struct Orchestrator {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    converter: Arc<dyn Converter>,
    sink: Arc<dyn ShardSink>,
    ledger: Option<ProgressLedger>,
    abort: AbortHandle,
    progress: watch::Sender<RunProgress>,
}

/// What a single run needs once partitioning is over.
struct RunContext {
    source: SourceReader,
    partitioner: Partitioner,
    allocator: ShardIdAllocator,
    pool: FetchWorkerPool,
    events: mpsc::UnboundedSender<WorkerEvent>,
    /// Ids done before this run started.
    done_before: Arc<HashSet<u64>>,
}

/// Output of the partitioning phase.
struct Prepared {
    ctx: RunContext,
    ledger: ProgressLedger,
    error_log: ErrorLog,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    total: u64,
    skipped: u64,
}

/// Mutable bookkeeping of the event loop.
#[derive(Default)]
struct RunTally {
    /// Ids done or failed during this run.
    finished: HashSet<u64>,
    done: u64,
    failed: u64,
    shards_written: u64,
    restarts: Vec<u32>,
    draining: HashSet<usize>,
    failure: Option<String>,
}

impl Orchestrator {
    /// Create an orchestrator with explicit fetcher and converter.
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>, converter: Arc<dyn Converter>) -> Self {
        let sink = create_sink(config.output.output_format);
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            config,
            fetcher,
            converter,
            sink,
            ledger: None,
            abort: AbortHandle::new(),
            progress,
        }
    }

    /// Create an orchestrator with the HTTP fetcher and the configured converter.
    pub fn from_config(config: Config) -> Result<Self, OrchestratorError> {
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let converter = create_converter(&config.converter);
        Ok(Self::new(config, fetcher, converter))
    }

    /// Replace the shard sink chosen from the output format.
    pub fn with_sink(mut self, sink: Arc<dyn ShardSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use this ledger instead of the one stored in the output folder.
    pub fn with_ledger(mut self, ledger: ProgressLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle that stops the run: workers stop taking input, drain in-flight
    /// fetches within the grace period and flush what they hold.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Live progress of the run.
    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    pub fn state(&self) -> OrchestratorState {
        self.progress.borrow().state
    }

    /// Runs to a terminal state.
    ///
    /// Returns `Err` only when the run cannot start (bad input, unusable output
    /// folder). Worker failures and aborts are reported in the summary state.
    pub async fn run(&self) -> Result<RunSummary, OrchestratorError> {
        let state = self.state();
        if state != OrchestratorState::Idle {
            return Err(OrchestratorError::AlreadyStarted(state.as_str()));
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let output_dir = self.config.output.output_folder.clone();
        self.set_state(OrchestratorState::Partitioning);

        let Prepared {
            ctx,
            ledger,
            mut error_log,
            mut events_rx,
            total,
            skipped,
        } = match self.prepare(&output_dir).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Run could not start");
                self.set_state(OrchestratorState::Failed);
                return Err(e);
            }
        };

        self.set_state(OrchestratorState::Running);
        info!(
            total,
            skipped,
            workers = ctx.partitioner.workers(),
            threads = self.config.fetch.thread_count,
            output = %output_dir.display(),
            "Starting run"
        );

        let mut tally = RunTally {
            restarts: vec![0; ctx.partitioner.workers()],
            ..Default::default()
        };
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        for index in 0..ctx.partitioner.workers() {
            match self.worker_records(&ctx, index, &tally) {
                Ok(records) => self.spawn_worker(&mut workers, &ctx, index, records),
                Err(e) => self.fail(&mut tally, format!("worker {} input: {}", index, e)),
            }
        }

        while !workers.is_empty() {
            tokio::select! {
                biased;
                Some(event) = events_rx.recv() => {
                    self.handle_event(event, &ledger, &mut error_log, &mut tally).await;
                }
                Some(joined) = workers.join_next() => {
                    while let Ok(event) = events_rx.try_recv() {
                        self.handle_event(event, &ledger, &mut error_log, &mut tally).await;
                    }
                    self.handle_exit(joined, &ctx, &mut workers, &mut tally);
                }
            }
            self.check_draining(&tally, workers.len());
        }
        drop(ctx);
        while let Ok(event) = events_rx.try_recv() {
            self.handle_event(event, &ledger, &mut error_log, &mut tally).await;
        }
        let error_log_path = error_log.path().to_path_buf();
        drop(error_log);

        let unprocessed = total.saturating_sub(skipped + tally.done + tally.failed);
        let state = if tally.failure.is_some() {
            OrchestratorState::Failed
        } else if unprocessed == 0 {
            OrchestratorState::Done
        } else if self.abort.is_aborted() {
            OrchestratorState::Aborted
        } else {
            tally.failure = Some(format!("{} records were never processed", unprocessed));
            OrchestratorState::Failed
        };

        let summary = RunSummary {
            state,
            output_folder: output_dir.clone(),
            total_input: total,
            skipped_already_done: skipped,
            done: tally.done,
            failed: tally.failed,
            unprocessed,
            done_total: ledger
                .load()
                .map(|ids| ids.len() as u64)
                .unwrap_or(skipped + tally.done),
            shards_written: tally.shards_written,
            restarts: tally.restarts.iter().sum(),
            error_log: error_log_path,
            failure: tally.failure.clone(),
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };

        if let Err(e) = self.finalize(&output_dir, &summary, &ledger) {
            error!(error = %e, "Failed to write run reports");
            self.set_state(OrchestratorState::Failed);
            return Err(e);
        }
        self.set_state(state);

        match state {
            OrchestratorState::Failed => error!(
                done = summary.done,
                failed = summary.failed,
                unprocessed,
                reason = summary.failure.as_deref().unwrap_or(""),
                "Run failed"
            ),
            _ => info!(
                state = %state,
                done = summary.done,
                failed = summary.failed,
                unprocessed,
                shards = summary.shards_written,
                elapsed_ms = summary.elapsed_ms,
                "Run finished"
            ),
        }

        Ok(summary)
    }

    /// Partitioning phase: everything up to spawning workers.
    async fn prepare(&self, output_dir: &Path) -> Result<Prepared, OrchestratorError> {
        let input = &self.config.input;
        let source = SourceReader::open(&input.url_list, input.input_format, &input.columns())?;
        let total = source.validate_rows()?;

        std::fs::create_dir_all(output_dir).map_err(|e| OutputError::io(output_dir, e))?;
        let ledger = self.ledger_for(output_dir)?;
        ledger.check_fingerprint(&source.fingerprint()?)?;

        let scan = scan_output(output_dir)?;
        let removed = scan.remove_orphans()?;
        let reconciled = reconcile(&ledger, &scan)?;
        if removed > 0 || reconciled > 0 {
            info!(
                removed_orphans = removed,
                reconciled_ids = reconciled,
                "Reconciled output folder with ledger"
            );
        }

        let done_before = Arc::new(ledger.load()?);
        let skipped = (0..total).filter(|id| done_before.contains(id)).count() as u64;
        metrics::RECORDS_SKIPPED.inc_by(skipped);

        let error_log = ErrorLog::open(output_dir).await?;
        let partitioner = Partitioner::new(
            self.config.orchestrator.partition,
            self.config.fetch.processes_count,
            total,
        );
        let (events, events_rx) = mpsc::unbounded_channel();

        self.progress.send_modify(|p| {
            p.total_input = total;
            p.skipped_already_done = skipped;
        });

        let ctx = RunContext {
            source,
            partitioner,
            allocator: ShardIdAllocator::starting_at(scan.next_shard_id),
            pool: self.build_pool(),
            events,
            done_before,
        };
        Ok(Prepared {
            ctx,
            ledger,
            error_log,
            events_rx,
            total,
            skipped,
        })
    }

    fn ledger_for(&self, output_dir: &Path) -> Result<ProgressLedger, OrchestratorError> {
        match &self.ledger {
            Some(ledger) => Ok(ledger.clone()),
            None => Ok(ProgressLedger::open(output_dir)?),
        }
    }

    /// Pool template shared by every worker; retries wrap the fetcher when enabled.
    fn build_pool(&self) -> FetchWorkerPool {
        let attempt_timeout = Duration::from_secs(self.config.fetch.timeout_secs.max(1));
        let retry = &self.config.retry;

        let fetcher: Arc<dyn Fetcher> = if retry.max_attempts > 1 {
            Arc::new(
                RetryingFetcher::new(Arc::clone(&self.fetcher), retry.clone(), self.abort.signal())
                    .with_attempt_timeout(attempt_timeout),
            )
        } else {
            Arc::clone(&self.fetcher)
        };

        FetchWorkerPool::new(
            self.config.fetch.thread_count,
            fetcher,
            Arc::clone(&self.converter),
        )
        .with_fetch_timeout(retry.total_budget(attempt_timeout))
        .with_grace_period(self.config.orchestrator.abort_grace_period())
    }

    /// Ids of partition `index` that are neither done before nor finished in this run.
    fn worker_records(
        &self,
        ctx: &RunContext,
        index: usize,
        tally: &RunTally,
    ) -> Result<SourceRecords, OrchestratorError> {
        let skip: HashSet<u64> = ctx
            .done_before
            .iter()
            .chain(tally.finished.iter())
            .copied()
            .collect();
        let partitioner = ctx.partitioner;
        Ok(ctx
            .source
            .records()?
            .retain(move |id| partitioner.contains(index, id))
            .excluding(Arc::new(skip)))
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<WorkerResult>,
        ctx: &RunContext,
        index: usize,
        records: SourceRecords,
    ) {
        let worker = Worker {
            index,
            pool: ctx.pool.clone().with_label(format!("worker-{}", index)),
            writer: ShardWriter::new(
                &self.config.output,
                Arc::clone(&self.sink),
                ctx.allocator.clone(),
            )
            .with_worker(index),
            abort: self.abort.signal(),
            events: ctx.events.clone(),
        };

        let records = records.filter_map(move |row| match row {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(worker = index, error = %e, "Skipping unreadable row");
                None
            }
        });

        workers.spawn(async move {
            let result = AssertUnwindSafe(worker.run(records))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(WorkerError::Crash(panic_message(panic))));
            (index, result)
        });
    }

    async fn handle_event(
        &self,
        event: WorkerEvent,
        ledger: &ProgressLedger,
        error_log: &mut ErrorLog,
        tally: &mut RunTally,
    ) {
        match event {
            WorkerEvent::ShardFlushed { worker, flushed } => {
                let shard_id = flushed.handle.shard_id;
                let entries: Vec<ProgressEntry> = flushed
                    .stats
                    .record_ids
                    .iter()
                    .map(|&id| ProgressEntry::done(id, shard_id))
                    .collect();

                if let Err(e) = ledger.append_batch(&entries) {
                    self.fail(tally, format!("ledger append for shard {}: {}", shard_id, e));
                    return;
                }
                debug!(worker, shard_id, records = entries.len(), "Shard recorded in ledger");

                tally.done += entries.len() as u64;
                tally.shards_written += 1;
                tally.finished.extend(entries.iter().map(|e| e.record_id));
            }
            WorkerEvent::RecordFailed { worker, record } => {
                if let Err(e) = self.log_failure(&record, ledger, error_log).await {
                    self.fail(tally, format!("recording failure of {}: {}", record.id, e));
                    return;
                }
                debug!(worker, record_id = record.id, "Failure recorded");
                tally.failed += 1;
                tally.finished.insert(record.id);
            }
            WorkerEvent::Draining { worker } => {
                tally.draining.insert(worker);
            }
        }

        self.progress.send_modify(|p| {
            p.done = tally.done;
            p.failed = tally.failed;
            p.shards_written = tally.shards_written;
        });
    }

    /// Error log first, then the ledger, so a logged failure is never lost on resume.
    async fn log_failure(
        &self,
        record: &Record,
        ledger: &ProgressLedger,
        error_log: &mut ErrorLog,
    ) -> Result<(), OrchestratorError> {
        if let Some(entry) = ErrorEntry::from_record(record) {
            warn!(
                record_id = record.id,
                url = %record.url,
                kind = entry.kind.label(),
                message = %entry.message,
                "Record failed"
            );
            error_log.append(&entry).await?;
        }
        ledger.append(record.id, Outcome::Failed)?;
        Ok(())
    }

    fn handle_exit(
        &self,
        joined: Result<WorkerResult, tokio::task::JoinError>,
        ctx: &RunContext,
        workers: &mut JoinSet<WorkerResult>,
        tally: &mut RunTally,
    ) {
        let (index, result) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                self.fail(tally, format!("worker task lost: {}", e));
                return;
            }
        };

        let error = match result {
            Ok(_) => return,
            Err(e) => e,
        };

        let budget = self.config.orchestrator.max_worker_restarts;
        if tally.failure.is_some() || self.abort.is_aborted() {
            warn!(worker = index, error = %error, "Worker stopped during shutdown");
            return;
        }
        if tally.restarts[index] >= budget {
            self.fail(
                tally,
                format!(
                    "worker {} failed after {} restarts: {}",
                    index, tally.restarts[index], error
                ),
            );
            return;
        }

        tally.restarts[index] += 1;
        tally.draining.remove(&index);
        metrics::WORKER_RESTARTS.inc();
        self.progress
            .send_modify(|p| p.restarts = tally.restarts.iter().sum());
        warn!(
            worker = index,
            attempt = tally.restarts[index],
            budget,
            error = %error,
            "Restarting worker"
        );

        match self.worker_records(ctx, index, tally) {
            Ok(records) => self.spawn_worker(workers, ctx, index, records),
            Err(e) => self.fail(tally, format!("worker {} input on restart: {}", index, e)),
        }
    }

    /// Records the first failure and stops every worker.
    fn fail(&self, tally: &mut RunTally, reason: String) {
        error!(reason = %reason, "Run failing");
        if tally.failure.is_none() {
            tally.failure = Some(reason);
        }
        self.abort.abort();
    }

    fn check_draining(&self, tally: &RunTally, running: usize) {
        if running > 0
            && tally.draining.len() >= running
            && self.state() == OrchestratorState::Running
        {
            self.set_state(OrchestratorState::Draining);
        }
    }

    /// Compacts the error log, then writes the manifest, the summary and the
    /// optional metrics dump.
    fn finalize(
        &self,
        output_dir: &Path,
        summary: &RunSummary,
        ledger: &ProgressLedger,
    ) -> Result<(), OrchestratorError> {
        compact_error_log(&summary.error_log, &ledger.load()?)?;
        Manifest::from_stats(&read_stats(output_dir)?).write(output_dir)?;
        write_json(&output_dir.join(SUMMARY_FILE), summary)?;

        if self.config.metrics.enabled {
            let path = output_dir.join(METRICS_FILE);
            let text = metrics::encode_metrics().map_err(|e| OutputError::serialization(&path, e))?;
            write_text(&path, &text)?;
        }
        Ok(())
    }

    fn set_state(&self, state: OrchestratorState) {
        let previous = self.progress.borrow().state;
        if previous != state {
            debug!(from = %previous, to = %state, "Run state changed");
            self.progress.send_modify(|p| p.state = state);
        }
    }
}

/// Re-appends ids of committed shards the ledger does not know about.
///
/// Covers a crash between a shard commit and its ledger append, so resume
/// never refetches an id that is already in a sealed shard.
fn reconcile(ledger: &ProgressLedger, scan: &OutputScan) -> Result<usize, OrchestratorError> {
    let known = ledger.load()?;
    let mut reconciled = 0;
    for stats in &scan.committed {
        let missing: Vec<ProgressEntry> = stats
            .record_ids
            .iter()
            .filter(|id| !known.contains(id))
            .map(|&id| ProgressEntry::done(id, stats.shard_id))
            .collect();
        if missing.is_empty() {
            continue;
        }
        warn!(
            shard_id = stats.shard_id,
            missing = missing.len(),
            "Committed shard missing from ledger, re-appending"
        );
        ledger.append_batch(&missing)?;
        reconciled += missing.len();
    }
    Ok(reconciled)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
