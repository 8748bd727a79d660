use crate::config::SinkOptions;
use crate::errors::{AppError, AppResult};
use crate::sink::handler::LineHandler;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// The terminator byte most recently processed, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lookback {
    #[default]
    None,
    SawCr,
    SawLf,
}

impl Lookback {
    fn after(byte: u8) -> Self {
        match byte {
            CR => Self::SawCr,
            LF => Self::SawLf,
            _ => Self::None,
        }
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == CR || byte == LF
}

/// Splits a byte stream into lines on CR, LF and CRLF and hands each completed
/// line, without its terminator, to a [`LineHandler`].
///
/// A CR always ends a line. An LF ends a line unless the previous byte was a CR
/// or an LF, so CRLF counts once and runs of LF after a break add nothing.
/// Partial lines survive across writes until a terminator, `flush` or `close`.
pub struct LineSink<H: LineHandler> {
    handler: H,
    buffer: Vec<u8>,
    lookback: Lookback,
    max_line_bytes: Option<usize>,
    overflowed_bytes: usize,
    lines_emitted: u64,
    bytes_written: u64,
    deferred_error: Option<AppError>,
    closed: bool,
}

impl<H: LineHandler> LineSink<H> {
    pub fn new(handler: H) -> Self {
        Self::with_options(handler, SinkOptions::default())
    }

    pub fn with_options(handler: H, options: SinkOptions) -> Self {
        Self {
            handler,
            buffer: Vec::with_capacity(options.initial_capacity),
            lookback: Lookback::None,
            max_line_bytes: options.max_line_bytes,
            overflowed_bytes: 0,
            lines_emitted: 0,
            bytes_written: 0,
            deferred_error: None,
            closed: false,
        }
    }

    pub fn write_byte(&mut self, byte: u8) -> AppResult<()> {
        self.bytes_written = self.bytes_written.saturating_add(1);
        self.accept_byte(byte)
    }

    /// Feeds a block of bytes. Runs without terminators are appended in one go;
    /// the outcome matches calling [`write_byte`](Self::write_byte) per byte.
    /// A handler error stops the block at the terminator that triggered it;
    /// later bytes of the block are not consumed.
    pub fn write_block(&mut self, bytes: &[u8]) -> AppResult<()> {
        self.feed(bytes).1
    }

    /// Emits the pending partial line, if there is one.
    pub fn flush(&mut self) -> AppResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.emit_line()
    }

    /// Flushes the pending line and releases the handler. Later calls do nothing.
    ///
    /// The handler is released even when the final flush fails. An error held back
    /// by `io::Write::write` is returned first, then the flush error.
    pub fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let deferred = match self.deferred_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        };
        let flushed = self.flush();
        let released = self.handler.release();
        deferred.and(flushed).and(released)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn take_overflowed_bytes(&mut self) -> usize {
        std::mem::take(&mut self.overflowed_bytes)
    }

    /// Returns how many bytes were consumed, including a terminator whose line
    /// the handler rejected.
    fn feed(&mut self, bytes: &[u8]) -> (usize, AppResult<()>) {
        let mut offset = 0;
        let mut result = Ok(());
        'scan: while offset < bytes.len() {
            let run_len = bytes[offset..]
                .iter()
                .position(|byte| is_terminator(*byte))
                .unwrap_or(bytes.len() - offset);
            if run_len > 0 {
                self.append(&bytes[offset..offset + run_len]);
                self.lookback = Lookback::None;
                offset += run_len;
            }

            while offset < bytes.len() && is_terminator(bytes[offset]) {
                let byte = bytes[offset];
                offset += 1;
                if let Err(error) = self.accept_byte(byte) {
                    result = Err(error);
                    break 'scan;
                }
            }
        }
        self.bytes_written = self.bytes_written.saturating_add(offset as u64);
        (offset, result)
    }

    fn accept_byte(&mut self, byte: u8) -> AppResult<()> {
        let result = match byte {
            CR => self.emit_line(),
            LF if self.lookback == Lookback::None => self.emit_line(),
            LF => Ok(()),
            _ => {
                self.append(&[byte]);
                Ok(())
            }
        };
        self.lookback = Lookback::after(byte);
        result
    }

    fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if let Some(max) = self.max_line_bytes {
            if self.buffer.len() > max {
                let excess = self.buffer.len() - max;
                self.buffer.drain(..excess);
                self.overflowed_bytes = self.overflowed_bytes.saturating_add(excess);
            }
        }
    }

    fn emit_line(&mut self) -> AppResult<()> {
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.handler.on_line(&line)?;
        self.lines_emitted = self.lines_emitted.saturating_add(1);
        Ok(())
    }
}

/// A handler error part-way through `buf` is held back: `write` reports the bytes
/// consumed up to and including the rejected line, and the next `write` or
/// `flush` returns the error without consuming anything.
impl<H: LineHandler> std::io::Write for LineSink<H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error.into());
        }
        let (consumed, result) = self.feed(buf);
        if let Err(error) = result {
            self.deferred_error = Some(error);
        }
        Ok(consumed)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error.into());
        }
        LineSink::flush(self)?;
        Ok(())
    }
}

impl<H: LineHandler> Drop for LineSink<H> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!(error = %error, "line sink close failed during drop");
        }
    }
}
