//! Settings management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Bridge settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub dispatch: DispatchSettings,
    pub logging: LoggingSettings,
}

/// Limits applied to every engine the host creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub memory_limit_bytes: Option<usize>,
    pub max_stack_size_bytes: Option<usize>,
    pub gc_threshold_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Name given to the engine's owning thread.
    pub thread_name: String,
    /// Run queued promise jobs after each evaluation.
    pub drain_pending_jobs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            thread_name: "chunk-js".to_string(),
            drain_pending_jobs: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_uses_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings.dispatch.thread_name, "chunk-js");
        assert!(settings.dispatch.drain_pending_jobs);
        assert_eq!(settings.logging.filter, "info");
        assert!(settings.engine.memory_limit_bytes.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_json(
            r#"{ "engine": { "memory_limit_bytes": 1048576 }, "dispatch": { "drain_pending_jobs": false } }"#,
        )
        .unwrap();
        assert_eq!(settings.engine.memory_limit_bytes, Some(1_048_576));
        assert!(settings.engine.max_stack_size_bytes.is_none());
        assert!(!settings.dispatch.drain_pending_jobs);
        assert_eq!(settings.dispatch.thread_name, "chunk-js");
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "logging": {{ "filter": "chunk_script=debug" }} }}"#).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.logging.filter, "chunk_script=debug");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Settings::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Settings::from_json("{ engine: ").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
