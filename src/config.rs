//! Loader configuration, read from YAML or JSON

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Io { path: String, error: String },

    #[error("Invalid JSON config: {reason}")]
    InvalidJson { reason: String },

    #[error("Invalid YAML config: {reason}")]
    InvalidYaml { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.json` files are JSON; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory top-level and bare specifiers resolve against.
    pub root_dir: PathBuf,
    /// Extension appended to specifiers that have none.
    pub extension: String,
    /// Default tracing level when `RUST_LOG` is not set.
    pub log_level: String,
    /// Per-attempt fetch timeout in milliseconds.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            extension: "mod".to_string(),
            log_level: "info".to_string(),
            fetch_timeout_ms: None,
        }
    }
}

impl LoaderConfig {
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::InvalidJson {
                    reason: e.to_string(),
                })
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidYaml {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_overrides_defaults() {
        let config = LoaderConfig::parse(
            "root_dir: /srv/modules\nfetch_timeout_ms: 250\n",
            ConfigFormat::Yaml,
        )
        .unwrap();

        assert_eq!(config.root_dir, PathBuf::from("/srv/modules"));
        assert_eq!(config.extension, "mod");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.fetch_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_json_config() {
        let config =
            LoaderConfig::parse(r#"{"extension": "js", "log_level": "debug"}"#, ConfigFormat::Json)
                .unwrap();
        assert_eq!(config.extension, "js");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.fetch_timeout(), None);
    }

    #[test]
    fn test_invalid_config_reports_format() {
        let err = LoaderConfig::parse("{not json", ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidJson { .. }));

        let err = LoaderConfig::parse("root_dir: [unclosed", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidYaml { .. }));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/loader.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("loader.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("loader")), ConfigFormat::Yaml);
    }
}
