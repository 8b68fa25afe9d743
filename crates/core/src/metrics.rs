//! Prometheus metrics for the harvesting pipeline.
//!
//! This module provides metrics for:
//! - Fetching (results by kind, latency, bytes, retries)
//! - Shard output (shards written)
//! - Supervision and resume (worker restarts, skipped records)
//!
//! Metrics live in process-wide statics. [`encode_metrics`] renders the crate
//! registry in the Prometheus text format for `metrics.prom`.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry holding every pipeline metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        registry.register(metric).unwrap();
    }
    registry
});

// =============================================================================
// Fetch Metrics
// =============================================================================

/// Completed fetches by result.
pub static FETCH_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pdfharvest_fetch_results_total", "Completed fetches by result"),
        &["result"], // "success", "timeout", "http_error", "conversion_error", "network_error"
    )
    .unwrap()
});

/// Fetch plus conversion duration in seconds.
pub static FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pdfharvest_fetch_duration_seconds",
            "Duration of a fetch including conversion",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["result"],
    )
    .unwrap()
});

/// Bytes received from successful fetches.
pub static BYTES_FETCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pdfharvest_bytes_fetched_total", "Bytes received").unwrap()
});

/// Fetch retries by error kind.
pub static FETCH_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pdfharvest_fetch_retries_total", "Fetch retries by error kind"),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Output Metrics
// =============================================================================

/// Shards committed by output format.
pub static SHARDS_WRITTEN: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pdfharvest_shards_written_total", "Shards committed"),
        &["format"],
    )
    .unwrap()
});

/// Records appended to the progress ledger by outcome.
pub static LEDGER_APPENDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pdfharvest_ledger_appends_total", "Progress ledger entries"),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Supervision Metrics
// =============================================================================

/// Worker restarts after a crash or an unrecoverable write error.
pub static WORKER_RESTARTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pdfharvest_worker_restarts_total", "Worker restarts").unwrap()
});

/// Input records skipped because a previous run finished them.
pub static RECORDS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pdfharvest_records_skipped_total",
        "Records skipped on resume",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all pipeline metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Fetch
        Box::new(FETCH_RESULTS.clone()),
        Box::new(FETCH_DURATION.clone()),
        Box::new(BYTES_FETCHED.clone()),
        Box::new(FETCH_RETRIES.clone()),
        // Output
        Box::new(SHARDS_WRITTEN.clone()),
        Box::new(LEDGER_APPENDS.clone()),
        // Supervision
        Box::new(WORKER_RESTARTS.clone()),
        Box::new(RECORDS_SKIPPED.clone()),
    ]
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
