//! PDF validation and metadata extraction.
//!
//! This is a byte-level scan, not a PDF parser: it checks the header and the
//! trailer marker and pulls a few fields out of uncompressed object
//! dictionaries. Documents whose page tree lives in compressed object streams
//! report no page count.

use crate::fetcher::FetchedContent;
use crate::record::{DocumentInfo, Payload};

use super::error::ConverterError;
use super::md5_hex;
use super::traits::Converter;

const HEADER: &[u8] = b"%PDF-";
const EOF_MARKER: &[u8] = b"%%EOF";
/// Some producers emit junk before the header; readers accept it within the first KiB.
const HEADER_SEARCH_WINDOW: usize = 1024;
const TRAILER_SEARCH_WINDOW: usize = 2048;
const MAX_TITLE_BYTES: usize = 512;

/// Converter that only accepts well-formed PDF documents.
#[derive(Debug, Clone, Default)]
pub struct PdfConverter {
    compute_md5: bool,
}

impl PdfConverter {
    pub fn new(compute_md5: bool) -> Self {
        Self { compute_md5 }
    }

    /// Extracts document details from raw PDF bytes.
    pub fn inspect(bytes: &[u8]) -> Result<DocumentInfo, ConverterError> {
        if bytes.is_empty() {
            return Err(ConverterError::Empty);
        }

        let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
        let header_pos = find(window, HEADER).ok_or_else(|| ConverterError::NotPdf {
            content_type: "unknown".to_string(),
        })?;

        let version = parse_version(&bytes[header_pos + HEADER.len()..])
            .ok_or_else(|| ConverterError::malformed("invalid PDF header version"))?;

        let tail = &bytes[bytes.len().saturating_sub(TRAILER_SEARCH_WINDOW)..];
        if find(tail, EOF_MARKER).is_none() {
            return Err(ConverterError::malformed(
                "missing %%EOF marker, document is truncated",
            ));
        }

        let page_count = count_pages(bytes);

        Ok(DocumentInfo {
            pdf_version: Some(version),
            page_count: (page_count > 0).then_some(page_count),
            title: extract_title(bytes),
        })
    }
}

impl Converter for PdfConverter {
    fn name(&self) -> &str {
        "pdf"
    }

    fn convert(&self, content: FetchedContent) -> Result<Payload, ConverterError> {
        let document = Self::inspect(&content.bytes).map_err(|e| match e {
            ConverterError::NotPdf { .. } => ConverterError::NotPdf {
                content_type: content
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            },
            other => other,
        })?;

        let md5 = self.compute_md5.then(|| md5_hex(&content.bytes));

        Ok(Payload {
            bytes: content.bytes,
            content_type: content.content_type,
            extension: "pdf".to_string(),
            md5,
            document,
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn is_pdf_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_pdf_whitespace(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn parse_version(after_header: &[u8]) -> Option<String> {
    let version: String = after_header
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();

    if version.is_empty() || !version.contains('.') {
        None
    } else {
        Some(version)
    }
}

/// Counts `/Type /Page` dictionaries, ignoring `/Type /Pages` tree nodes.
fn count_pages(bytes: &[u8]) -> u32 {
    let mut count = 0;
    let mut pos = 0;

    while let Some(found) = find(&bytes[pos..], b"/Type") {
        let value = skip_whitespace(bytes, pos + found + b"/Type".len());
        if bytes[value..].starts_with(b"/Page") {
            let next = bytes.get(value + b"/Page".len());
            if !matches!(next, Some(c) if c.is_ascii_alphanumeric()) {
                count += 1;
            }
        }
        pos = value;
    }

    count
}

fn extract_title(bytes: &[u8]) -> Option<String> {
    let key = find(bytes, b"/Title")?;
    let start = skip_whitespace(bytes, key + b"/Title".len());
    if bytes.get(start) != Some(&b'(') {
        return None;
    }

    let mut raw = Vec::new();
    let mut depth = 1;
    let mut pos = start + 1;

    while pos < bytes.len() && raw.len() < MAX_TITLE_BYTES {
        let b = bytes[pos];
        match b {
            b'\\' => {
                pos += 1;
                match bytes.get(pos) {
                    Some(b'n') => raw.push(b'\n'),
                    Some(b'r') => raw.push(b'\r'),
                    Some(b't') => raw.push(b'\t'),
                    Some(&other) => raw.push(other),
                    None => break,
                }
            }
            b'(' => {
                depth += 1;
                raw.push(b);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                raw.push(b);
            }
            _ => raw.push(b),
        }
        pos += 1;
    }

    let title = decode_text_string(&raw);
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// PDF text strings are either PDFDocEncoding or UTF-16BE with a BOM.
fn decode_text_string(raw: &[u8]) -> String {
    if raw.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(raw).into_owned()
    }
}
