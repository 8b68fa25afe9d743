//! Error types for the converter module.

use thiserror::Error;

/// Errors that can occur while turning fetched bytes into a storable payload.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The response body was empty.
    #[error("Empty document")]
    Empty,

    /// The content does not start with a PDF header.
    #[error("Not a PDF document (content type: {content_type})")]
    NotPdf { content_type: String },

    /// The content looks like a PDF but is damaged.
    #[error("Malformed document: {reason}")]
    Malformed { reason: String },
}

impl ConverterError {
    /// Creates a new malformed document error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
