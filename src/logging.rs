use crate::errors::{AppError, AppResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const LOG_FILE_NAME: &str = "process-output.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. With a directory, events are written as JSON
/// to a daily rolling file; without one, a compact format goes to stderr.
pub fn init_tracing(log_dir: Option<&Path>) -> AppResult<()> {
    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .compact()
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| AppError::Internal(error.to_string()));
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::init_tracing;

    #[test]
    fn second_init_is_rejected_but_creates_log_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = dir.path().join("logs");
        let first = init_tracing(Some(&log_dir));
        assert!(log_dir.is_dir());

        if first.is_ok() {
            assert!(init_tracing(None).is_err());
        }
    }
}
