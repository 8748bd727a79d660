use crate::errors::{AppError, AppResult};
use crate::sink::sanitize::strip_terminal_escapes;
use std::sync::{Arc, Mutex};
use tracing::Level;

/// Receives every completed line from a [`LineSink`](crate::sink::LineSink).
pub trait LineHandler {
    fn on_line(&mut self, line: &str) -> AppResult<()>;

    /// Releases whatever the handler wraps. Called once, when the sink closes.
    fn release(&mut self) -> AppResult<()> {
        Ok(())
    }
}

impl<F> LineHandler for F
where
    F: FnMut(&str) -> AppResult<()>,
{
    fn on_line(&mut self, line: &str) -> AppResult<()> {
        self(line)
    }
}

/// Forwards lines to `tracing`, tagged with the stream they came from.
#[derive(Debug, Clone)]
pub struct TracingHandler {
    stream: &'static str,
    level: Level,
    strip_ansi: bool,
}

impl TracingHandler {
    pub fn new(stream: &'static str, level: Level) -> Self {
        Self {
            stream,
            level,
            strip_ansi: true,
        }
    }

    pub fn with_strip_ansi(mut self, strip_ansi: bool) -> Self {
        self.strip_ansi = strip_ansi;
        self
    }

    pub fn stream(&self) -> &'static str {
        self.stream
    }
}

impl LineHandler for TracingHandler {
    fn on_line(&mut self, line: &str) -> AppResult<()> {
        let sanitized = if self.strip_ansi {
            strip_terminal_escapes(line)
        } else {
            line.to_string()
        };
        if sanitized.is_empty() {
            return Ok(());
        }

        let stream = self.stream;
        match self.level {
            Level::ERROR => tracing::error!(stream, line = %sanitized, "process output"),
            Level::WARN => tracing::warn!(stream, line = %sanitized, "process output"),
            Level::INFO => tracing::info!(stream, line = %sanitized, "process output"),
            Level::DEBUG => tracing::debug!(stream, line = %sanitized, "process output"),
            _ => tracing::trace!(stream, line = %sanitized, "process output"),
        }
        Ok(())
    }
}

/// Collects lines into a buffer shared by every clone of the handler.
#[derive(Debug, Clone, Default)]
pub struct CollectingHandler {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl LineHandler for CollectingHandler {
    fn on_line(&mut self, line: &str) -> AppResult<()> {
        self.lines
            .lock()
            .map_err(|_| AppError::Internal("line collector lock poisoned".to_string()))?
            .push(line.to_string());
        Ok(())
    }
}
