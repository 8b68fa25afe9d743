//! Configuration for the converter module.

use serde::{Deserialize, Serialize};

/// Kind of content the pipeline expects to download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Validate and inspect PDF documents.
    #[default]
    Pdf,
    /// Store bodies as they are.
    Raw,
}

/// Configuration for payload conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Expected content kind.
    #[serde(default)]
    pub content: ContentKind,

    /// Compute an md5 digest of each payload.
    #[serde(default = "default_compute_md5")]
    pub compute_md5: bool,
}

fn default_compute_md5() -> bool {
    true
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            content: ContentKind::default(),
            compute_md5: default_compute_md5(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.content, ContentKind::Pdf);
        assert!(config.compute_md5);
    }

    #[test]
    fn test_deserialize_raw() {
        let config: ConverterConfig = toml::from_str(
            r#"
            content = "raw"
            compute_md5 = false
        "#,
        )
        .unwrap();
        assert_eq!(config.content, ContentKind::Raw);
        assert!(!config.compute_md5);
    }
}
