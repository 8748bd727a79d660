pub mod handler;
pub mod line_sink;
pub mod sanitize;

pub use handler::{CollectingHandler, LineHandler, TracingHandler};
pub use line_sink::LineSink;
