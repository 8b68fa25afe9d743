//! Orchestrator lifecycle integration tests.
//!
//! These tests drive complete runs over a temporary output folder with a
//! scripted fetcher: partition -> fetch -> shard -> ledger -> summary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_test::assert_ok;

use pdfharvest_core::{
    create_converter,
    fetcher::FetchErrorKind,
    output::{read_error_log, Manifest, ERROR_LOG_FILE, MANIFEST_FILE, SUMMARY_FILE},
    shard::{read_stats, FilesSink},
    testing::{fixtures, FailingSink, MockFetcher},
    Config, Orchestrator, OrchestratorState, OutputFormat, PartitionStrategy, ProgressLedger,
    RunSummary, ShardSink,
};

/// Test helper owning the input file and output folder of one scenario.
struct TestHarness {
    input: PathBuf,
    output: PathBuf,
    fetcher: MockFetcher,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(records: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = fixtures::write_csv(temp_dir.path(), records);
        let output = temp_dir.path().join("dataset");
        Self {
            input,
            output,
            fetcher: MockFetcher::new(),
            _temp_dir: temp_dir,
        }
    }

    fn config(&self, processes: usize, threads: usize) -> Config {
        let mut config = Config::default();
        config.input.url_list = self.input.clone();
        config.output.output_folder = self.output.clone();
        config.output.number_sample_per_shard = 3;
        config.fetch.processes_count = processes;
        config.fetch.thread_count = threads;
        config.fetch.timeout_secs = 2;
        config
    }

    fn orchestrator(&self, config: Config) -> Orchestrator {
        Orchestrator::new(
            config,
            Arc::new(self.fetcher.clone()),
            create_converter(&Default::default()),
        )
    }

    /// Record ids of every committed shard, with duplicates kept.
    fn stored_ids(&self) -> Vec<u64> {
        read_stats(&self.output)
            .expect("Failed to read shard markers")
            .into_iter()
            .flat_map(|stats| stats.record_ids)
            .collect()
    }

    fn failed_ids(&self) -> HashSet<u64> {
        read_error_log(&self.output.join(ERROR_LOG_FILE))
            .expect("Failed to read error log")
            .into_iter()
            .map(|entry| entry.record_id)
            .collect()
    }
}

fn assert_unique(ids: &[u64]) -> HashSet<u64> {
    let set: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(set.len(), ids.len(), "an id was stored twice: {:?}", ids);
    set
}

fn read_summary(output: &Path) -> RunSummary {
    let body = std::fs::read_to_string(output.join(SUMMARY_FILE)).expect("summary.json missing");
    serde_json::from_str(&body).expect("summary.json is not a run summary")
}

#[tokio::test]
async fn test_unreachable_urls_are_logged_not_stored() {
    let harness = TestHarness::new(10);
    for id in [1, 4, 7] {
        harness
            .fetcher
            .fail_url(&fixtures::url(id), FetchErrorKind::NetworkError);
    }

    let orchestrator = harness.orchestrator(harness.config(2, 4));
    let summary = assert_ok!(orchestrator.run().await);

    assert_eq!(summary.state, OrchestratorState::Done);
    assert_eq!(summary.total_input, 10);
    assert_eq!(summary.done, 7);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.unprocessed, 0);
    assert_eq!(summary.done + summary.failed, summary.total_input);

    let stored = assert_unique(&harness.stored_ids());
    assert_eq!(stored.len(), 7);
    assert!(stored.is_disjoint(&HashSet::from([1, 4, 7])));

    let errors = read_error_log(&summary.error_log).unwrap();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.kind == FetchErrorKind::NetworkError));
    assert_eq!(harness.failed_ids(), HashSet::from([1, 4, 7]));

    let manifest: Manifest = serde_json::from_str(
        &std::fs::read_to_string(harness.output.join(MANIFEST_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.total_records, 7);
    assert_eq!(read_summary(&harness.output), summary);
}

#[tokio::test]
async fn test_outcomes_do_not_depend_on_concurrency() {
    let mut outcomes = Vec::new();

    for (processes, threads, strategy) in [
        (1, 1, PartitionStrategy::Contiguous),
        (3, 2, PartitionStrategy::Contiguous),
        (4, 8, PartitionStrategy::RoundRobin),
    ] {
        let harness = TestHarness::new(25);
        harness
            .fetcher
            .fail_url(&fixtures::url(3), FetchErrorKind::HttpError(404));
        harness
            .fetcher
            .fail_url(&fixtures::url(17), FetchErrorKind::Timeout);

        let mut config = harness.config(processes, threads);
        config.orchestrator.partition = strategy;
        let summary = harness.orchestrator(config).run().await.unwrap();
        assert_eq!(summary.state, OrchestratorState::Done);
        assert!(harness.fetcher.max_concurrency() <= processes * threads);
        assert!(!harness.fetcher.saw_duplicate_in_flight());

        let stored = assert_unique(&harness.stored_ids());
        outcomes.push((stored, harness.failed_ids()));
    }

    assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(outcomes[0].1, HashSet::from([3, 17]));
}

#[tokio::test]
async fn test_retries_recover_transient_failures() {
    let harness = TestHarness::new(6);
    harness
        .fetcher
        .fail_times(&fixtures::url(2), FetchErrorKind::NetworkError, 2);
    harness
        .fetcher
        .fail_url(&fixtures::url(5), FetchErrorKind::HttpError(404));

    let mut config = harness.config(1, 2);
    config.retry.max_attempts = 3;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    let summary = harness.orchestrator(config).run().await.unwrap();

    assert_eq!(summary.done, 5);
    assert_eq!(summary.failed, 1);
    assert_eq!(harness.fetcher.fetch_count(&fixtures::url(2)), 3);
    // Permanent failures are not retried.
    assert_eq!(harness.fetcher.fetch_count(&fixtures::url(5)), 1);
}

#[tokio::test]
async fn test_crashed_worker_is_restarted() {
    let harness = TestHarness::new(12);
    harness.fetcher.panic_once(&fixtures::url(4));

    let mut config = harness.config(2, 2);
    config.orchestrator.max_worker_restarts = 2;
    let summary = harness.orchestrator(config).run().await.unwrap();

    assert_eq!(summary.state, OrchestratorState::Done);
    assert_eq!(summary.restarts, 1);
    assert_eq!(summary.done, 12);

    let stored = assert_unique(&harness.stored_ids());
    assert_eq!(stored, (0..12).collect::<HashSet<u64>>());
    assert!(!harness.fetcher.saw_duplicate_in_flight());
}

#[tokio::test]
async fn test_transient_write_failures_are_absorbed() {
    let harness = TestHarness::new(6);
    let sink = FailingSink::new(FilesSink::new()).fail_first(2);

    let mut config = harness.config(1, 2);
    config.output.flush_attempts = 3;
    let summary = harness
        .orchestrator(config)
        .with_sink(Arc::new(sink.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.state, OrchestratorState::Done);
    assert_eq!(summary.restarts, 0);
    assert_eq!(summary.done, 6);
    assert!(sink.attempts() > 2);
}

#[tokio::test]
async fn test_persistent_write_failure_fails_run() {
    let harness = TestHarness::new(6);
    let sink = FailingSink::new(FilesSink::new()).fail_always();

    let mut config = harness.config(1, 2);
    config.output.flush_attempts = 2;
    config.orchestrator.max_worker_restarts = 1;
    let summary = harness
        .orchestrator(config)
        .with_sink(Arc::new(sink))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.state, OrchestratorState::Failed);
    assert_eq!(summary.restarts, 1);
    assert_eq!(summary.done, 0);
    assert!(summary.failure.is_some());
    assert!(harness.stored_ids().is_empty());

    let ledger = ProgressLedger::open(&harness.output).unwrap();
    assert!(ledger.load().unwrap().is_empty());
    assert_eq!(read_summary(&harness.output).state, OrchestratorState::Failed);
}

#[tokio::test]
async fn test_tar_output_holds_every_member() {
    let harness = TestHarness::new(4);
    let mut config = harness.config(1, 4);
    config.output.output_format = OutputFormat::Tar;
    config.output.number_sample_per_shard = 10;

    let orchestrator = harness.orchestrator(config);
    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.shards_written, 1);

    let file = std::fs::File::open(harness.output.join("00000.tar")).unwrap();
    let mut archive = tar::Archive::new(file);
    let mut names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().display().to_string())
        .collect();
    names.sort();

    assert_eq!(names.len(), 12);
    assert!(names.contains(&"000000003.pdf".to_string()));
    assert!(names.contains(&"000000003.txt".to_string()));
    assert!(names.contains(&"000000003.json".to_string()));
}

#[tokio::test]
async fn test_metrics_file_written_when_enabled() {
    let harness = TestHarness::new(2);
    let mut config = harness.config(1, 1);
    config.metrics.enabled = true;

    harness.orchestrator(config).run().await.unwrap();

    let text = std::fs::read_to_string(harness.output.join("metrics.prom")).unwrap();
    assert!(text.contains("pdfharvest_shards_written_total"));
}

#[tokio::test]
async fn test_custom_sink_is_used() {
    let harness = TestHarness::new(3);
    let sink: Arc<dyn ShardSink> = Arc::new(FailingSink::new(FilesSink::new()));

    let summary = harness
        .orchestrator(harness.config(1, 1))
        .with_sink(sink)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.done, 3);
    assert!(harness.output.join("00000").is_dir());
}

#[tokio::test]
async fn test_hanging_fetch_times_out() {
    let harness = TestHarness::new(3);
    harness.fetcher.hang_url(&fixtures::url(1));

    let mut config = harness.config(1, 3);
    config.fetch.timeout_secs = 1;
    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        harness.orchestrator(config).run(),
    )
    .await
    .expect("run did not finish")
    .unwrap();

    assert_eq!(summary.done, 2);
    assert_eq!(summary.failed, 1);
    let errors = read_error_log(&summary.error_log).unwrap();
    assert_eq!(errors[0].kind, FetchErrorKind::Timeout);
}
