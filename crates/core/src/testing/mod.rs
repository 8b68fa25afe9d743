//! Testing utilities and mock implementations for pipeline tests.
//!
//! This module provides a scriptable fetcher and a failing shard sink so the
//! whole pipeline can be exercised without network access or a broken disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use pdfharvest_core::testing::{fixtures, MockFetcher};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.fail_url(&fixtures::url(3), FetchErrorKind::NetworkError);
//!
//! let input = fixtures::write_csv(dir.path(), 10);
//! // Build an Orchestrator with the mock...
//! ```

mod failing_sink;
mod mock_fetcher;

pub use failing_sink::FailingSink;
pub use mock_fetcher::MockFetcher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fmt::Write as _;
    use std::path::{Path, PathBuf};

    use crate::record::Record;

    /// Builds a minimal uncompressed PDF with `pages` page objects.
    pub fn pdf_bytes(pages: u32, title: Option<&str>) -> Vec<u8> {
        let mut doc = String::from("%PDF-1.7\n");
        let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();

        doc.push_str("1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let _ = writeln!(
            doc,
            "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {} >>\nendobj",
            kids.join(" "),
            pages
        );
        for i in 0..pages {
            let _ = writeln!(
                doc,
                "{} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj",
                i + 3
            );
        }
        if let Some(title) = title {
            let _ = writeln!(
                doc,
                "{} 0 obj\n<< /Title ({}) /Producer (fixtures) >>\nendobj",
                pages + 3,
                title
            );
        }
        doc.push_str("trailer\n<< /Root 1 0 R >>\n%%EOF\n");
        doc.into_bytes()
    }

    /// Deterministic URL for row `id`.
    pub fn url(id: u64) -> String {
        format!("https://docs.example.com/papers/{}.pdf", id)
    }

    pub fn caption(id: u64) -> String {
        format!("paper number {}", id)
    }

    /// Pending records `0..n` with fixture URLs and captions.
    pub fn records(n: u64) -> Vec<Record> {
        (0..n).map(|i| Record::new(i, url(i), caption(i))).collect()
    }

    /// Writes a `url,caption` CSV with `n` rows and returns its path.
    pub fn write_csv(dir: &Path, n: u64) -> PathBuf {
        let mut body = String::from("url,caption\n");
        for i in 0..n {
            let _ = writeln!(body, "{},\"{}\"", url(i), caption(i));
        }
        let path = dir.join("input.csv");
        std::fs::write(&path, body).expect("write fixture csv");
        path
    }
}
