use serde::{Deserialize, Serialize};

use crate::converter::ConverterConfig;
use crate::fetcher::FetchConfig;
use crate::orchestrator::{OrchestratorConfig, RetryConfig};
use crate::shard::OutputConfig;
use crate::source::InputConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metrics configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Write `metrics.prom` into the output folder at the end of a run.
    #[serde(default)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::OutputFormat;
    use crate::source::InputFormat;

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[input]
url_list = "urls.tsv"
input_format = "tsv"
url_col = "link"
caption_col = "title"
additional_columns = ["license"]

[output]
output_folder = "/data/pdfs"
output_format = "tar"
number_sample_per_shard = 500

[fetch]
processes_count = 2
thread_count = 8
timeout_secs = 30

[retry]
max_attempts = 3

[metrics]
enabled = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.input.input_format, InputFormat::Tsv);
        assert_eq!(config.input.columns().additional, vec!["license"]);
        assert_eq!(config.output.output_format, OutputFormat::Tar);
        assert_eq!(config.output.number_sample_per_shard, 500);
        assert_eq!(config.fetch.processes_count, 2);
        assert_eq!(config.fetch.thread_count, 8);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.input.url_col, "url");
        assert_eq!(config.output.number_sample_per_shard, 10_000);
        assert_eq!(config.fetch.thread_count, 32);
        assert_eq!(config.retry.max_attempts, 1);
        assert!(!config.metrics.enabled);
        assert!(config.converter.compute_md5);
    }

    #[test]
    fn test_deserialize_unknown_format_fails() {
        let toml = r#"
[output]
output_format = "zip"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
