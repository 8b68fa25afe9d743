//! Shard sink that fails on demand.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::shard::{OutputFormat, Shard, ShardError, ShardHandle, ShardSink};

/// Wraps a real sink and fails some of its writes with an I/O error.
///
/// Useful for exercising flush retries and the worker restart budget.
///
/// # Example
///
/// ```rust,ignore
/// use pdfharvest_core::shard::FilesSink;
/// use pdfharvest_core::testing::FailingSink;
///
/// let sink = FailingSink::new(FilesSink::new()).fail_first(2);
/// // Third write succeeds.
/// ```
#[derive(Clone)]
pub struct FailingSink {
    inner: Arc<dyn ShardSink>,
    fail_remaining: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

impl FailingSink {
    /// Wraps `inner`. Nothing fails until configured.
    pub fn new(inner: impl ShardSink + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            fail_remaining: Arc::new(AtomicU32::new(0)),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail the next `n` writes.
    pub fn fail_first(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every write.
    pub fn fail_always(self) -> Self {
        self.fail_first(u32::MAX)
    }

    /// Stop failing.
    pub fn heal(&self) {
        self.fail_remaining.store(0, Ordering::SeqCst);
    }

    /// Writes attempted so far, failed or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ShardSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn format(&self) -> OutputFormat {
        self.inner.format()
    }

    fn write(&self, shard: &Shard, output_dir: &Path) -> Result<ShardHandle, ShardError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok();

        if should_fail {
            return Err(ShardError::io(
                output_dir,
                std::io::Error::other("injected write failure"),
            ));
        }

        self.inner.write(shard, output_dir)
    }
}
