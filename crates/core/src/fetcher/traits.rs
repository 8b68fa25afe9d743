//! Trait definitions for the fetcher module.

use async_trait::async_trait;

use super::types::{FetchError, FetchedContent};

/// Retrieves the content behind a URL.
///
/// Implementations classify every failure into a [`FetchError`]; they never retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Fetches a single URL.
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError>;
}
