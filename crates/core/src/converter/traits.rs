//! Trait definitions for the converter module.

use crate::fetcher::FetchedContent;
use crate::record::Payload;

use super::error::ConverterError;

/// Turns fetched content into a payload that can be written to a shard.
///
/// Conversion is CPU-bound and synchronous; the fetch pool runs it on the
/// blocking thread pool.
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Converts fetched content into a payload.
    fn convert(&self, content: FetchedContent) -> Result<Payload, ConverterError>;
}
