//! Ambient configuration for the inspector CLI.
//!
//! Loaded only by `src/bin/inspect.rs` — the library never reads a config
//! file itself, so embedding it in another process never pulls in `toml`
//! or touches the filesystem.

use serde::{Deserialize, Serialize};

use crate::check::model::Severity;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub parallel_checks: usize,
    pub default_severity: Option<Severity>,
    pub log_level: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            parallel_checks: 10,
            default_severity: None,
            log_level: "info".to_string(),
        }
    }
}

impl InspectorConfig {
    /// Loads `inspector.toml` from `path` if present, falling back to
    /// defaults when the file does not exist. A malformed file is an error.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = InspectorConfig::load(std::path::Path::new("/nonexistent/inspector.toml")).unwrap();
        assert_eq!(config.parallel_checks, 10);
    }

    #[test]
    fn test_parses_toml() {
        let config: InspectorConfig = toml::from_str("parallel_checks = 4\nlog_level = \"debug\"\n").unwrap();
        assert_eq!(config.parallel_checks, 4);
        assert_eq!(config.log_level, "debug");
    }
}
