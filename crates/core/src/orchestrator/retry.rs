//! Bounded retry around a fetcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::abort::AbortSignal;
use crate::fetcher::{FetchError, FetchedContent, Fetcher};
use crate::metrics;

use super::config::RetryConfig;

/// Retries retryable failures of the wrapped fetcher with exponential backoff.
///
/// Non-retryable failures (4xx other than 408/429, conversion errors) are
/// returned immediately. An abort during a backoff wait returns the last error.
pub struct RetryingFetcher {
    inner: Arc<dyn Fetcher>,
    config: RetryConfig,
    abort: AbortSignal,
    attempt_timeout: Option<Duration>,
}

impl RetryingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, config: RetryConfig, abort: AbortSignal) -> Self {
        Self {
            inner,
            config,
            abort,
            attempt_timeout: None,
        }
    }

    /// Bounds each attempt separately; a timed-out attempt counts as `Timeout`.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    async fn attempt(&self, url: &str) -> Result<FetchedContent, FetchError> {
        match self.attempt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.inner.fetch(url))
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::timeout(format!(
                        "attempt timed out after {} ms",
                        timeout.as_millis()
                    )))
                }),
            None => self.inner.fetch(url).await,
        }
    }
}

#[async_trait]
impl Fetcher for RetryingFetcher {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match self.attempt(url).await {
                Ok(content) => return Ok(content),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts || self.abort.is_aborted() {
                return Err(error);
            }

            let delay = self.config.delay_for(attempt);
            debug!(
                url = %url,
                attempt,
                kind = error.kind.label(),
                delay_ms = delay.as_millis() as u64,
                "Retrying fetch"
            );
            metrics::FETCH_RETRIES
                .with_label_values(&[error.kind.label()])
                .inc();

            let mut abort = self.abort.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = abort.aborted() => return Err(error),
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortHandle;
    use crate::fetcher::FetchErrorKind;
    use crate::testing::MockFetcher;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    fn retrying(mock: &MockFetcher, max_attempts: u32) -> RetryingFetcher {
        RetryingFetcher::new(Arc::new(mock.clone()), config(max_attempts), AbortSignal::never())
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let mock = MockFetcher::new();
        mock.fail_times("u", FetchErrorKind::NetworkError, 2);

        assert!(retrying(&mock, 3).fetch("u").await.is_ok());
        assert_eq!(mock.fetch_count("u"), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let mock = MockFetcher::new();
        mock.fail_url("u", FetchErrorKind::HttpError(503));

        let err = retrying(&mock, 3).fetch("u").await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::HttpError(503));
        assert_eq!(mock.fetch_count("u"), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_not_retried() {
        let mock = MockFetcher::new();
        mock.fail_url("u", FetchErrorKind::HttpError(404));

        retrying(&mock, 5).fetch("u").await.unwrap_err();
        assert_eq!(mock.fetch_count("u"), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_retried() {
        let mock = MockFetcher::new();
        mock.hang_url("slow");
        let fetcher = retrying(&mock, 2).with_attempt_timeout(Duration::from_millis(20));

        let err = fetcher.fetch("slow").await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
        assert_eq!(mock.fetch_count("slow"), 2);
    }

    #[tokio::test]
    async fn test_abort_stops_backoff() {
        let mock = MockFetcher::new();
        mock.fail_url("u", FetchErrorKind::Timeout);
        let handle = AbortHandle::new();
        let fetcher = RetryingFetcher::new(
            Arc::new(mock.clone()),
            RetryConfig {
                max_attempts: 10,
                initial_delay_ms: 60_000,
                max_delay_ms: 60_000,
                backoff_multiplier: 1.0,
            },
            handle.signal(),
        );

        let task = tokio::spawn(async move { fetcher.fetch("u").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind, FetchErrorKind::Timeout);
        assert_eq!(mock.fetch_count("u"), 1);
    }
}
