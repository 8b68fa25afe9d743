//! Configuration for the fetcher module.

use serde::{Deserialize, Serialize};

/// Configuration for fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of workers, each with its own shard writer.
    #[serde(default = "default_processes_count")]
    pub processes_count: usize,

    /// Concurrent fetches per worker.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Reject bodies larger than this many bytes.
    #[serde(default)]
    pub max_body_bytes: Option<u64>,
}

fn default_processes_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_thread_count() -> usize {
    32
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:72.0) Gecko/20100101 Firefox/72.0".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            processes_count: default_processes_count(),
            thread_count: default_thread_count(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            max_body_bytes: None,
        }
    }
}

impl FetchConfig {
    pub fn with_processes(mut self, count: usize) -> Self {
        self.processes_count = count;
        self
    }

    pub fn with_threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert!(config.processes_count >= 1);
        assert_eq!(config.thread_count, 32);
        assert_eq!(config.timeout_secs, 10);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert!(config.max_body_bytes.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: FetchConfig = toml::from_str(
            r#"
            processes_count = 16
            thread_count = 64
        "#,
        )
        .unwrap();
        assert_eq!(config.processes_count, 16);
        assert_eq!(config.thread_count, 64);
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_builder() {
        let config = FetchConfig::default()
            .with_processes(2)
            .with_threads(4)
            .with_timeout_secs(3);
        assert_eq!(config.processes_count, 2);
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.timeout_secs, 3);
    }
}
