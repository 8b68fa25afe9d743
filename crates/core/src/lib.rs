pub mod abort;
pub mod config;
pub mod converter;
pub mod fetcher;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod output;
pub mod record;
pub mod shard;
pub mod source;
pub mod testing;

pub use abort::{AbortHandle, AbortSignal};
pub use config::{
    load_config, load_config_from_str, load_env_config, validate_config, Config, ConfigError,
    MetricsConfig,
};
pub use converter::{create_converter, ContentKind, Converter, ConverterConfig, ConverterError};
pub use fetcher::{
    FetchConfig, FetchError, FetchErrorKind, FetchWorkerPool, Fetcher, FetchedContent,
    HttpFetcher, PoolReport,
};
pub use ledger::{LedgerError, Outcome, ProgressEntry, ProgressLedger};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorState, PartitionStrategy,
    RetryConfig, RunProgress, RunSummary,
};
pub use output::{read_error_log, ErrorEntry, Manifest, OutputError};
pub use record::{DocumentInfo, Payload, Record, RecordStatus};
pub use shard::{create_sink, OutputConfig, OutputFormat, ShardError, ShardSink, ShardStats};
pub use source::{Columns, InputConfig, InputFormat, SourceError, SourceReader};
