use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_INITIAL_CAPACITY: usize = 132;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SinkOptions {
    pub initial_capacity: usize,
    /// Upper bound for a pending line; older bytes are dropped once exceeded.
    pub max_line_bytes: Option<usize>,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_line_bytes: None,
        }
    }
}

impl SinkOptions {
    pub fn validate(&self) -> AppResult<()> {
        if self.initial_capacity == 0 {
            return Err(AppError::Config("initialCapacity must be greater than zero".to_string()));
        }
        if self.max_line_bytes == Some(0) {
            return Err(AppError::Config("maxLineBytes must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub strip_ansi: bool,
    pub sink: SinkOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            strip_ansi: true,
            sink: SinkOptions::default(),
        }
    }
}

impl RunOptions {
    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        let options: Self = serde_json::from_str(raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("failed to read {}: {}", path.display(), error)))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("pollIntervalMs must be greater than zero".to_string()));
        }
        self.sink.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::{RunOptions, SinkOptions, DEFAULT_INITIAL_CAPACITY};
    use crate::errors::AppError;
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let options = RunOptions::from_json_str("{}").expect("defaults");
        assert_eq!(options, RunOptions::default());
        assert_eq!(options.sink.initial_capacity, DEFAULT_INITIAL_CAPACITY);
        assert!(options.strip_ansi);
    }

    #[test]
    fn partial_sink_section_keeps_other_defaults() {
        let options = RunOptions::from_json_str(r#"{"timeoutSeconds": 5, "sink": {"maxLineBytes": 64}}"#)
            .expect("parse");
        assert_eq!(options.timeout_seconds, 5);
        assert_eq!(options.sink.max_line_bytes, Some(64));
        assert_eq!(options.sink.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn rejects_zero_limits() {
        let zero_line = SinkOptions {
            max_line_bytes: Some(0),
            ..SinkOptions::default()
        };
        assert!(matches!(zero_line.validate(), Err(AppError::Config(_))));

        let result = RunOptions::from_json_str(r#"{"pollIntervalMs": 0}"#);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let result = RunOptions::from_json_str("{not json");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"stripAnsi": false}}"#).expect("write config");
        let options = RunOptions::from_json_file(file.path()).expect("load");
        assert!(!options.strip_ansi);
    }
}
