//! Turns raw process output into lines.
//!
//! [`LineSink`] accepts bytes in arbitrary chunks, splits them on CR, LF and
//! CRLF and passes each completed line to a [`LineHandler`]. [`runner`] binds a
//! pair of sinks to a child process's stdout and stderr.

pub mod config;
pub mod errors;
pub mod logging;
pub mod pump;
pub mod runner;
pub mod sink;

pub use config::{RunOptions, SinkOptions};
pub use errors::{AppError, AppResult};
pub use logging::init_tracing;
pub use pump::{pump, pump_async};
pub use runner::{run_logged, run_traced, CommandSpec, RunOutcome, StreamStats};
pub use sink::{CollectingHandler, LineHandler, LineSink, TracingHandler};
