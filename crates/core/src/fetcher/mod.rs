//! Fetcher module: retrieving URL content and the bounded worker pool.
//!
//! - [`Fetcher`]: the seam for retrieving one URL ([`HttpFetcher`] in production)
//! - [`FetchWorkerPool`]: runs at most `thread_count` fetch+convert tasks at a time
//!
//! The pool never retries and never touches the filesystem; failures are
//! classified into [`FetchErrorKind`] and returned on the record.
//!
//! # Example
//!
//! ```ignore
//! use pdfharvest_core::fetcher::{FetchConfig, FetchWorkerPool, HttpFetcher};
//!
//! let fetcher = Arc::new(HttpFetcher::new(&FetchConfig::default())?);
//! let pool = FetchWorkerPool::new(32, fetcher, converter);
//! let (mut rx, handle) = pool.run(records, AbortSignal::never());
//! while let Some(record) = rx.recv().await {
//!     println!("{} -> {:?}", record.id, record.status);
//! }
//! ```

mod config;
mod http;
mod pool;
mod traits;
mod types;

pub use config::FetchConfig;
pub use http::HttpFetcher;
pub use pool::FetchWorkerPool;
pub use traits::Fetcher;
pub use types::{FetchError, FetchErrorKind, FetchedContent, PoolReport};
