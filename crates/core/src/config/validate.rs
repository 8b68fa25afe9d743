use crate::shard::RESERVED_META_KEYS;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - An input file is set, and tabular formats name their url and caption columns
/// - Additional columns do not shadow record metadata fields
/// - Worker, thread, timeout and shard sizes are not 0
/// - Retry backoff never shrinks
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let input = &config.input;
    if input.url_list.as_os_str().is_empty() {
        return invalid("input.url_list must be set");
    }
    if input.input_format.has_header() {
        if input.url_col.trim().is_empty() {
            return invalid("input.url_col cannot be empty");
        }
        if input.caption_col.trim().is_empty() {
            return invalid("input.caption_col cannot be empty");
        }
    }
    if let Some(col) = input
        .additional_columns
        .iter()
        .find(|col| RESERVED_META_KEYS.contains(&col.as_str()))
    {
        return Err(ConfigError::ValidationError(format!(
            "input.additional_columns cannot contain '{}', it is a record metadata field",
            col
        )));
    }

    let fetch = &config.fetch;
    if fetch.processes_count == 0 {
        return invalid("fetch.processes_count cannot be 0");
    }
    if fetch.thread_count == 0 {
        return invalid("fetch.thread_count cannot be 0");
    }
    if fetch.timeout_secs == 0 {
        return invalid("fetch.timeout_secs cannot be 0");
    }

    let output = &config.output;
    if output.number_sample_per_shard == 0 {
        return invalid("output.number_sample_per_shard cannot be 0");
    }
    if output.max_shard_bytes == 0 {
        return invalid("output.max_shard_bytes cannot be 0");
    }
    if output.flush_attempts == 0 {
        return invalid("output.flush_attempts cannot be 0");
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return invalid("retry.max_attempts cannot be 0");
    }
    if retry.backoff_multiplier < 1.0 {
        return invalid("retry.backoff_multiplier must be at least 1.0");
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        return invalid("retry.initial_delay_ms cannot exceed retry.max_delay_ms");
    }

    Ok(())
}

fn invalid(reason: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InputFormat;

    fn valid() -> Config {
        let mut config = Config::default();
        config.input.url_list = "urls.csv".into();
        config
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_validate_missing_input_fails() {
        let err = validate_config(&Config::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = valid();
        config.fetch.thread_count = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.fetch.processes_count = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_shard_size_fails() {
        let mut config = valid();
        config.output.number_sample_per_shard = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("number_sample_per_shard"));
    }

    #[test]
    fn test_validate_empty_column_fails_only_with_header() {
        let mut config = valid();
        config.input.caption_col = " ".to_string();
        assert!(validate_config(&config).is_err());

        config.input.input_format = InputFormat::Txt;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_reserved_additional_column_fails() {
        let mut config = valid();
        config.input.additional_columns = vec!["license".to_string(), "status".to_string()];
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("'status'"), "{}", err);

        config.input.additional_columns = vec!["license".to_string()];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_shrinking_backoff_fails() {
        let mut config = valid();
        config.retry.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());
    }
}
