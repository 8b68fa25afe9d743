//! Passthrough converter.

use crate::fetcher::FetchedContent;
use crate::record::{DocumentInfo, Payload};

use super::error::ConverterError;
use super::md5_hex;
use super::traits::Converter;

/// Stores response bodies unchanged, picking the file extension from the content type.
#[derive(Debug, Clone, Default)]
pub struct RawConverter {
    compute_md5: bool,
}

impl RawConverter {
    pub fn new(compute_md5: bool) -> Self {
        Self { compute_md5 }
    }
}

impl Converter for RawConverter {
    fn name(&self) -> &str {
        "raw"
    }

    fn convert(&self, content: FetchedContent) -> Result<Payload, ConverterError> {
        if content.bytes.is_empty() {
            return Err(ConverterError::Empty);
        }

        let extension = extension_for(content.content_type.as_deref()).to_string();
        let md5 = self.compute_md5.then(|| md5_hex(&content.bytes));

        Ok(Payload {
            bytes: content.bytes,
            content_type: content.content_type,
            extension,
            md5,
            document: DocumentInfo::default(),
        })
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match essence.as_deref() {
        Some("application/pdf") => "pdf",
        Some("text/html") => "html",
        Some("text/plain") => "txt",
        Some("application/json") => "json",
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(extension_for(Some("application/pdf")), "pdf");
        assert_eq!(extension_for(Some("text/html; charset=utf-8")), "html");
        assert_eq!(extension_for(Some("Image/JPEG")), "jpg");
        assert_eq!(extension_for(None), "bin");
    }

    #[test]
    fn test_convert_keeps_bytes() {
        let converter = RawConverter::new(false);
        let payload = converter
            .convert(FetchedContent {
                url: "https://example.com/page".to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                bytes: b"<html></html>".to_vec(),
            })
            .unwrap();
        assert_eq!(payload.bytes, b"<html></html>");
        assert_eq!(payload.extension, "html");
        assert!(payload.md5.is_none());
    }
}
