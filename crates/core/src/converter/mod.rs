//! Converter module for turning fetched bodies into dataset payloads.
//!
//! Two implementations are provided:
//! - [`PdfConverter`]: validates the PDF header and trailer and extracts the
//!   version, page count and title
//! - [`RawConverter`]: stores the body unchanged
//!
//! # Example
//!
//! ```ignore
//! use pdfharvest_core::converter::{create_converter, ConverterConfig};
//!
//! let converter = create_converter(&ConverterConfig::default());
//! let payload = converter.convert(fetched)?;
//! println!("{} pages", payload.document.page_count.unwrap_or(0));
//! ```

mod config;
mod error;
mod pdf;
mod raw;
mod traits;

use std::sync::Arc;

pub use config::{ContentKind, ConverterConfig};
pub use error::ConverterError;
pub use pdf::PdfConverter;
pub use raw::RawConverter;
pub use traits::Converter;

/// Builds the converter selected by the configuration.
pub fn create_converter(config: &ConverterConfig) -> Arc<dyn Converter> {
    match config.content {
        ContentKind::Pdf => Arc::new(PdfConverter::new(config.compute_md5)),
        ContentKind::Raw => Arc::new(RawConverter::new(config.compute_md5)),
    }
}

/// Hex md5 digest of a payload.
pub(crate) fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}
