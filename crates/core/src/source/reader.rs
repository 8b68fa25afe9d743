//! Lazy readers over the supported input formats.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::ledger::ProgressLedger;
use crate::record::Record;

use super::config::{Columns, InputFormat};
use super::error::SourceError;

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
struct Layout {
    url: usize,
    caption: usize,
    extra: Vec<(String, usize)>,
}

/// An opened, schema-checked input file.
///
/// Every call to [`SourceReader::records`] re-opens the file, so a sequence can
/// be restarted any number of times. Record ids are zero-based data row
/// indices and stay stable between runs over the same file.
#[derive(Debug, Clone)]
pub struct SourceReader {
    path: PathBuf,
    format: InputFormat,
    columns: Columns,
    layout: Option<Layout>,
}

impl SourceReader {
    /// Opens the input and checks that the configured columns exist.
    pub fn open(
        path: impl AsRef<Path>,
        format: InputFormat,
        columns: &Columns,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();

        let layout = match format {
            InputFormat::Parquet => {
                return Err(SourceError::invalid_format(
                    &path,
                    "unsupported input format: parquet",
                ))
            }
            InputFormat::Csv | InputFormat::Tsv => {
                let mut reader = delimited_reader(&path, format)?;
                let headers = reader
                    .headers()
                    .map_err(|e| SourceError::invalid_format(&path, e.to_string()))?;
                let names: Vec<&str> = headers.iter().collect();
                Some(resolve_layout(&path, &names, columns)?)
            }
            InputFormat::Jsonl => {
                check_first_json_row(&path, columns)?;
                None
            }
            InputFormat::Txt => {
                if !columns.additional.is_empty() {
                    return Err(SourceError::invalid_format(
                        &path,
                        "txt input has no columns, additional_columns must be empty",
                    ));
                }
                File::open(&path).map_err(|e| SourceError::io(&path, e))?;
                None
            }
        };

        debug!(path = %path.display(), format = format.as_str(), "Opened input");

        Ok(Self {
            path,
            format,
            columns: columns.clone(),
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }

    /// Every record from the first row.
    pub fn records(&self) -> Result<SourceRecords, SourceError> {
        let rows = match self.format {
            InputFormat::Csv | InputFormat::Tsv => {
                let layout = self
                    .layout
                    .clone()
                    .ok_or_else(|| SourceError::invalid_format(&self.path, "missing header"))?;
                Rows::Delimited {
                    iter: delimited_reader(&self.path, self.format)?.into_records(),
                    layout,
                }
            }
            InputFormat::Jsonl => Rows::Json {
                lines: open_lines(&self.path)?,
                columns: self.columns.clone(),
            },
            InputFormat::Txt => Rows::Text {
                lines: open_lines(&self.path)?,
            },
            InputFormat::Parquet => {
                return Err(SourceError::invalid_format(
                    &self.path,
                    "unsupported input format: parquet",
                ))
            }
        };

        Ok(SourceRecords {
            path: self.path.clone(),
            rows,
            next_id: 0,
            start: 0,
            filter: None,
        })
    }

    /// Records whose id is at least `offset`.
    pub fn records_from(&self, offset: u64) -> Result<SourceRecords, SourceError> {
        let mut records = self.records()?;
        records.start = offset;
        Ok(records)
    }

    /// Records not yet marked done in the ledger, in input order.
    pub fn resume(&self, ledger: &ProgressLedger) -> Result<SourceRecords, SourceError> {
        let done = ledger.load()?;
        Ok(self.records()?.excluding(Arc::new(done)))
    }

    /// Reads the whole input once, returning the row count or the first bad row.
    pub fn validate_rows(&self) -> Result<u64, SourceError> {
        let mut count = 0;
        for record in self.records()? {
            record?;
            count += 1;
        }
        Ok(count)
    }

    /// Digest of the input bytes, format and column selection.
    pub fn fingerprint(&self) -> Result<String, SourceError> {
        let mut hasher = Sha256::new();
        hasher.update(self.format.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.columns.url.as_bytes());
        hasher.update([0]);
        hasher.update(self.columns.caption.as_bytes());
        for column in &self.columns.additional {
            hasher.update([0]);
            hasher.update(column.as_bytes());
        }

        let mut file = File::open(&self.path).map_err(|e| SourceError::io(&self.path, e))?;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .map_err(|e| SourceError::io(&self.path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

enum Rows {
    Delimited {
        iter: csv::StringRecordsIntoIter<File>,
        layout: Layout,
    },
    Json {
        lines: Lines<BufReader<File>>,
        columns: Columns,
    },
    Text {
        lines: Lines<BufReader<File>>,
    },
}

type IdFilter = Box<dyn Fn(u64) -> bool + Send>;

/// Lazy sequence of pending records.
pub struct SourceRecords {
    path: PathBuf,
    rows: Rows,
    next_id: u64,
    start: u64,
    filter: Option<IdFilter>,
}

impl SourceRecords {
    /// Drops records whose id is in `ids`.
    pub fn excluding(self, ids: Arc<HashSet<u64>>) -> Self {
        self.retain(move |id| !ids.contains(&id))
    }

    /// Keeps only records whose id satisfies `keep`. Filters compose.
    pub fn retain<F>(mut self, keep: F) -> Self
    where
        F: Fn(u64) -> bool + Send + 'static,
    {
        let combined: IdFilter = match self.filter.take() {
            Some(previous) => Box::new(move |id| previous(id) && keep(id)),
            None => Box::new(keep),
        };
        self.filter = Some(combined);
        self
    }

    fn next_row(&mut self) -> Option<Result<Record, SourceError>> {
        let id = self.next_id;
        let path = &self.path;

        let row = match &mut self.rows {
            Rows::Delimited { iter, layout } => {
                let row = iter.next()?;
                Some(row.map_err(|e| malformed(path, id, e)).map(|row| {
                    let field = |i: usize| row.get(i).unwrap_or_default().to_string();
                    let extra = layout
                        .extra
                        .iter()
                        .map(|(name, i)| (name.clone(), field(*i)))
                        .collect();
                    Record::new(id, field(layout.url).trim(), field(layout.caption))
                        .with_extra(extra)
                }))
            }
            Rows::Json { lines, columns } => loop {
                let line = match lines.next()? {
                    Ok(line) => line,
                    Err(e) => break Some(Err(SourceError::io(path.clone(), e))),
                };
                if line.trim().is_empty() {
                    continue;
                }
                break Some(parse_json_row(path, id, &line, columns));
            },
            Rows::Text { lines } => loop {
                let line = match lines.next()? {
                    Ok(line) => line,
                    Err(e) => break Some(Err(SourceError::io(path.clone(), e))),
                };
                let url = line.trim();
                if url.is_empty() {
                    continue;
                }
                break Some(Ok(Record::new(id, url, "")));
            },
        };

        self.next_id += 1;
        row
    }
}

impl Iterator for SourceRecords {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = self.next_row()?;
            let id = match &row {
                Ok(record) => record.id,
                Err(_) => return Some(row),
            };
            if id < self.start {
                continue;
            }
            if let Some(keep) = &self.filter {
                if !keep(id) {
                    continue;
                }
            }
            return Some(row);
        }
    }
}

fn delimited_reader(path: &Path, format: InputFormat) -> Result<csv::Reader<File>, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
    let delimiter = if format == InputFormat::Tsv { b'\t' } else { b',' };
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(file))
}

fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::io(path, e))?;
    Ok(BufReader::new(file).lines())
}

fn resolve_layout(path: &Path, names: &[&str], columns: &Columns) -> Result<Layout, SourceError> {
    let position = |column: &str| {
        names
            .iter()
            .position(|name| name.trim() == column)
            .ok_or_else(|| {
                SourceError::invalid_format(
                    path,
                    format!("missing required column '{}' (found: {})", column, names.join(", ")),
                )
            })
    };

    let url = position(&columns.url)?;
    let caption = position(&columns.caption)?;
    let extra = columns
        .additional
        .iter()
        .map(|name| position(name).map(|i| (name.clone(), i)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Layout { url, caption, extra })
}

fn check_first_json_row(path: &Path, columns: &Columns) -> Result<(), SourceError> {
    for line in open_lines(path)? {
        let line = line.map_err(|e| SourceError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)
            .map_err(|e| SourceError::invalid_format(path, format!("first row is not JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| SourceError::invalid_format(path, "first row is not a JSON object"))?;

        let required = [&columns.url, &columns.caption];
        for column in required.into_iter().chain(columns.additional.iter()) {
            if !object.contains_key(column) {
                return Err(SourceError::invalid_format(
                    path,
                    format!("missing required column '{}'", column),
                ));
            }
        }
        return Ok(());
    }
    // An empty file has no rows to check.
    Ok(())
}

fn parse_json_row(
    path: &Path,
    id: u64,
    line: &str,
    columns: &Columns,
) -> Result<Record, SourceError> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| malformed(path, id, e))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed(path, id, "row is not a JSON object"))?;

    let text = |column: &str| match object.get(column) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    if !object.contains_key(&columns.url) {
        return Err(malformed(
            path,
            id,
            format!("missing column '{}'", columns.url),
        ));
    }

    let extra: BTreeMap<String, String> = columns
        .additional
        .iter()
        .map(|name| (name.clone(), text(name)))
        .collect();

    Ok(Record::new(id, text(&columns.url).trim(), text(&columns.caption)).with_extra(extra))
}

fn malformed(path: &Path, row: u64, reason: impl ToString) -> SourceError {
    SourceError::MalformedRow {
        path: path.to_path_buf(),
        row,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Outcome, ProgressLedger};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn ids(records: SourceRecords) -> Vec<u64> {
        records.map(|r| r.unwrap().id).collect()
    }

    #[test]
    fn test_csv_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "in.csv",
            "caption,url,license\nfirst,https://a/0.pdf,cc\n\"with, comma\",https://a/1.pdf,mit\n",
        );
        let columns = Columns {
            additional: vec!["license".to_string()],
            ..Default::default()
        };

        let reader = SourceReader::open(&path, InputFormat::Csv, &columns).unwrap();
        let records: Vec<Record> = reader.records().unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 0);
        assert_eq!(records[0].url, "https://a/0.pdf");
        assert_eq!(records[1].caption, "with, comma");
        assert_eq!(records[1].extra.get("license").map(String::as_str), Some("mit"));
    }

    #[test]
    fn test_missing_column_is_invalid_format() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.csv", "link,caption\nhttps://a,b\n");
        let err = SourceReader::open(&path, InputFormat::Csv, &Columns::default()).unwrap_err();
        assert!(matches!(err, SourceError::InvalidFormat { ref reason, .. } if reason.contains("'url'")));

        let path = write(&dir, "in2.csv", "url\nhttps://a\n");
        let err = SourceReader::open(&path, InputFormat::Csv, &Columns::default()).unwrap_err();
        assert!(matches!(err, SourceError::InvalidFormat { .. }));
    }

    #[test]
    fn test_custom_column_names_tsv() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.tsv", "pdf\ttitle\nhttps://a/0.pdf\tZero\n");
        let columns = Columns {
            url: "pdf".to_string(),
            caption: "title".to_string(),
            additional: Vec::new(),
        };
        let reader = SourceReader::open(&path, InputFormat::Tsv, &columns).unwrap();
        let record = reader.records().unwrap().next().unwrap().unwrap();
        assert_eq!(record.caption, "Zero");
    }

    #[test]
    fn test_jsonl_and_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "in.jsonl",
            "{\"url\":\"https://a/0.pdf\",\"caption\":\"zero\",\"year\":2020}\n\n{\"url\":\"https://a/1.pdf\",\"caption\":null,\"year\":2021}\n",
        );
        let columns = Columns {
            additional: vec!["year".to_string()],
            ..Default::default()
        };
        let reader = SourceReader::open(&path, InputFormat::Jsonl, &columns).unwrap();
        let records: Vec<Record> = reader.records().unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, 1);
        assert_eq!(records[1].caption, "");
        assert_eq!(records[0].extra["year"], "2020");
    }

    #[test]
    fn test_jsonl_missing_column() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.jsonl", "{\"href\":\"x\",\"caption\":\"c\"}\n");
        assert!(matches!(
            SourceReader::open(&path, InputFormat::Jsonl, &Columns::default()),
            Err(SourceError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_txt_has_no_caption() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.txt", "https://a/0.pdf\n\n  https://a/1.pdf  \n");
        let reader = SourceReader::open(&path, InputFormat::Txt, &Columns::default()).unwrap();
        let records: Vec<Record> = reader.records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].url, "https://a/1.pdf");
        assert!(records[1].caption.is_empty());
    }

    #[test]
    fn test_parquet_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "in.parquet", "PAR1");
        let err = SourceReader::open(&path, InputFormat::Parquet, &Columns::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported input format"));
    }

    #[test]
    fn test_records_from_offset_and_restart() {
        let dir = TempDir::new().unwrap();
        let path = crate::testing::fixtures::write_csv(dir.path(), 6);
        let reader = SourceReader::open(&path, InputFormat::Csv, &Columns::default()).unwrap();

        assert_eq!(ids(reader.records_from(4).unwrap()), vec![4, 5]);
        // A fresh sequence starts over.
        assert_eq!(ids(reader.records().unwrap()), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(reader.validate_rows().unwrap(), 6);
    }

    #[test]
    fn test_resume_skips_done_only() {
        let dir = TempDir::new().unwrap();
        let path = crate::testing::fixtures::write_csv(dir.path(), 5);
        let reader = SourceReader::open(&path, InputFormat::Csv, &Columns::default()).unwrap();

        let ledger = ProgressLedger::in_memory("run").unwrap();
        ledger.append(1, Outcome::Done).unwrap();
        ledger.append(3, Outcome::Done).unwrap();
        ledger.append(4, Outcome::Failed).unwrap();

        assert_eq!(ids(reader.resume(&ledger).unwrap()), vec![0, 2, 4]);
    }

    #[test]
    fn test_filters_compose() {
        let dir = TempDir::new().unwrap();
        let path = crate::testing::fixtures::write_csv(dir.path(), 10);
        let reader = SourceReader::open(&path, InputFormat::Csv, &Columns::default()).unwrap();

        let records = reader
            .records()
            .unwrap()
            .retain(|id| id % 2 == 0)
            .excluding(Arc::new(HashSet::from([4])));
        assert_eq!(ids(records), vec![0, 2, 6, 8]);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = crate::testing::fixtures::write_csv(dir.path(), 3);
        let reader = SourceReader::open(&path, InputFormat::Csv, &Columns::default()).unwrap();
        let before = reader.fingerprint().unwrap();
        assert_eq!(before, reader.fingerprint().unwrap());

        fs::write(&path, "url,caption\nhttps://other,x\n").unwrap();
        assert_ne!(before, reader.fingerprint().unwrap());
    }
}
