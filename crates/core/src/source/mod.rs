//! Source module for reading the URL list.
//!
//! A [`SourceReader`] validates the schema once when opened and then hands out
//! lazy [`SourceRecords`] sequences. Supported layouts are CSV, TSV, JSON
//! lines and plain text with one URL per line.

mod config;
mod error;
mod reader;

pub use config::{Columns, InputConfig, InputFormat};
pub use error::SourceError;
pub use reader::{SourceReader, SourceRecords};
