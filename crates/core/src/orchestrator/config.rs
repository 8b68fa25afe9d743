//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How input ids are split across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Worker `k` gets the `k`-th contiguous block of ids.
    #[default]
    Contiguous,
    /// Id `i` goes to worker `i % workers`.
    RoundRobin,
}

/// Configuration for run supervision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Restarts allowed per worker after a crash or an unrecoverable
    /// shard write. Exceeding it fails the run.
    #[serde(default = "default_max_worker_restarts")]
    pub max_worker_restarts: u32,

    /// How long in-flight fetches may finish after an abort (milliseconds).
    #[serde(default = "default_abort_grace_period_ms")]
    pub abort_grace_period_ms: u64,

    #[serde(default)]
    pub partition: PartitionStrategy,
}

fn default_max_worker_restarts() -> u32 {
    3
}

fn default_abort_grace_period_ms() -> u64 {
    5000 // 5 seconds
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_worker_restarts: default_max_worker_restarts(),
            abort_grace_period_ms: default_abort_grace_period_ms(),
            partition: PartitionStrategy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn abort_grace_period(&self) -> Duration {
        Duration::from_millis(self.abort_grace_period_ms)
    }
}

/// Bounded retry with exponential backoff for retryable fetch failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per record, including the first. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Config for `retries` extra attempts after the first.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// Worst-case time for one record: every attempt timing out plus every backoff.
    pub fn total_budget(&self, attempt_timeout: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let backoff: Duration = (1..attempts).map(|a| self.delay_for(a)).sum();
        attempt_timeout * attempts + backoff
    }
}
