//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fetcher::{FetchError, FetchErrorKind, FetchedContent, Fetcher};

use super::fixtures;

/// Scripted behaviour for a single URL.
#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Fail(FetchErrorKind),
    FailTimes { kind: FetchErrorKind, remaining: u32 },
    Hang,
    PanicOnce,
}

/// Mock implementation of the Fetcher trait.
///
/// Provides controllable behavior for testing:
/// - Scripted responses, failures and hangs per URL
/// - Simulated latency
/// - Concurrency tracking (peak in-flight fetches, duplicate in-flight URLs)
/// - Call recording for "was this re-fetched?" assertions
///
/// Unscripted URLs return a small valid PDF.
///
/// # Example
///
/// ```rust,ignore
/// use pdfharvest_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new().with_delay(Duration::from_millis(10));
/// fetcher.fail_url("https://example.com/bad.pdf", FetchErrorKind::NetworkError);
///
/// // ... run the pipeline ...
///
/// assert_eq!(fetcher.fetch_count("https://example.com/bad.pdf"), 1);
/// assert!(!fetcher.saw_duplicate_in_flight());
/// ```
#[derive(Debug, Clone)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    delay: Arc<Mutex<Duration>>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    duplicate_seen: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            duplicate_seen: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate latency on every fetch.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    /// Return the given body for a URL.
    pub fn respond_with(&self, url: &str, body: Vec<u8>) {
        self.script(url, MockResponse::Body(body));
    }

    /// Fail every fetch of a URL with the given kind.
    pub fn fail_url(&self, url: &str, kind: FetchErrorKind) {
        self.script(url, MockResponse::Fail(kind));
    }

    /// Fail the first `times` fetches of a URL, then succeed.
    pub fn fail_times(&self, url: &str, kind: FetchErrorKind, times: u32) {
        self.script(
            url,
            MockResponse::FailTimes {
                kind,
                remaining: times,
            },
        );
    }

    /// Never complete a fetch of this URL.
    pub fn hang_url(&self, url: &str) {
        self.script(url, MockResponse::Hang);
    }

    /// Panic the first time the URL is fetched, succeed afterwards.
    pub fn panic_once(&self, url: &str) {
        self.script(url, MockResponse::PanicOnce);
    }

    /// Remove any scripted behaviour for a URL.
    pub fn reset_url(&self, url: &str) {
        self.responses.lock().unwrap().remove(url);
    }

    /// Number of times a URL was fetched.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Every fetched URL in call order.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_fetches(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of fetches that returned (successfully or not).
    pub fn completed_fetches(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Whether the same URL was ever fetched twice concurrently.
    pub fn saw_duplicate_in_flight(&self) -> bool {
        self.duplicate_seen.load(Ordering::SeqCst)
    }

    fn script(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Resolve the scripted response, consuming one-shot behaviours.
    fn next_response(&self, url: &str) -> Option<MockResponse> {
        let mut responses = self.responses.lock().unwrap();
        let response = responses.get_mut(url)?;
        match response {
            MockResponse::FailTimes { kind, remaining } => {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
                Some(MockResponse::Fail(*kind))
            }
            MockResponse::PanicOnce => {
                responses.remove(url);
                Some(MockResponse::PanicOnce)
            }
            other => Some(other.clone()),
        }
    }
}

/// Decrements the in-flight tracking when a fetch ends or is dropped.
struct InFlightGuard {
    fetcher: MockFetcher,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.fetcher.in_flight.lock().unwrap().remove(&self.url);
        self.fetcher.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        if !self.in_flight.lock().unwrap().insert(url.to_string()) {
            self.duplicate_seen.store(true, Ordering::SeqCst);
        }
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard {
            fetcher: self.clone(),
            url: url.to_string(),
        };

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match self.next_response(url) {
            Some(MockResponse::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(MockResponse::PanicOnce) => panic!("mock fetcher panic for {}", url),
            Some(MockResponse::Fail(kind)) => {
                Err(FetchError::new(kind, format!("mock {} for {}", kind, url)))
            }
            Some(MockResponse::Body(bytes)) => Ok(content(url, bytes)),
            Some(MockResponse::FailTimes { .. }) | None => {
                Ok(content(url, fixtures::pdf_bytes(1, None)))
            }
        };

        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

fn content(url: &str, bytes: Vec<u8>) -> FetchedContent {
    FetchedContent {
        url: url.to_string(),
        status: 200,
        content_type: Some("application/pdf".to_string()),
        bytes,
    }
}
