//! Configuration for the input source.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Layout of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Comma separated with a header row.
    #[default]
    Csv,
    /// Tab separated with a header row.
    Tsv,
    /// One JSON object per line.
    Jsonl,
    /// One URL per line, no header and no caption.
    Txt,
    /// Accepted by the configuration but not readable by this crate.
    Parquet,
}

impl InputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Jsonl => "jsonl",
            Self::Txt => "txt",
            Self::Parquet => "parquet",
        }
    }

    /// Whether rows carry named columns.
    pub fn has_header(&self) -> bool {
        !matches!(self, Self::Txt)
    }
}

impl std::str::FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "jsonl" | "json" => Ok(Self::Jsonl),
            "txt" => Ok(Self::Txt),
            "parquet" => Ok(Self::Parquet),
            other => Err(format!("unknown input format: {}", other)),
        }
    }
}

/// Column names to read from a tabular input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub url: String,
    pub caption: String,
    /// Extra columns copied into each record's metadata.
    pub additional: Vec<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            url: default_url_col(),
            caption: default_caption_col(),
            additional: Vec::new(),
        }
    }
}

/// Input file and schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path of the URL list.
    #[serde(default)]
    pub url_list: PathBuf,

    #[serde(default)]
    pub input_format: InputFormat,

    #[serde(default = "default_url_col")]
    pub url_col: String,

    #[serde(default = "default_caption_col")]
    pub caption_col: String,

    #[serde(default)]
    pub additional_columns: Vec<String>,
}

fn default_url_col() -> String {
    "url".to_string()
}

fn default_caption_col() -> String {
    "caption".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            url_list: PathBuf::new(),
            input_format: InputFormat::default(),
            url_col: default_url_col(),
            caption_col: default_caption_col(),
            additional_columns: Vec::new(),
        }
    }
}

impl InputConfig {
    pub fn columns(&self) -> Columns {
        Columns {
            url: self.url_col.clone(),
            caption: self.caption_col.clone(),
            additional: self.additional_columns.clone(),
        }
    }
}
