//! Run orchestrator: partitions the input, supervises workers and keeps the
//! ledger in step with durable shards.
//!
//! - **Workers**: one per partition, each a fetch pool feeding its own shard writer
//! - **Supervision**: a crashed worker (panic or unrecoverable shard flush) is
//!   restarted with its remaining ids, up to `max_worker_restarts`
//! - **Bookkeeping**: a single event loop appends to the ledger and the error log
//! - **Retries**: retryable fetch failures go through [`RetryingFetcher`]

mod config;
mod partition;
mod retry;
mod runner;
mod types;
mod worker;

pub use config::{OrchestratorConfig, PartitionStrategy, RetryConfig};
pub use partition::Partitioner;
pub use retry::RetryingFetcher;
pub use runner::Orchestrator;
pub use types::{OrchestratorError, OrchestratorState, RunProgress, RunSummary, WorkerError};
