use crate::errors::{AppError, AppResult};
use crate::sink::{LineHandler, LineSink};
use std::io::Read;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 4096;

/// Drains `reader` into `sink` until EOF, then flushes the trailing partial line.
/// Returns the number of bytes read.
pub fn pump<R: Read, H: LineHandler>(mut reader: R, sink: &mut LineSink<H>) -> AppResult<u64> {
    let mut chunk = vec![0_u8; CHUNK_SIZE];
    let mut total = 0_u64;
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(size) => {
                total = total.saturating_add(size as u64);
                sink.write_block(&chunk[..size])?;
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(AppError::Io(format!("failed to read stream: {}", error))),
        }
    }
    sink.flush()?;
    Ok(total)
}

pub async fn pump_async<R, H>(reader: R, sink: &mut LineSink<H>) -> AppResult<u64>
where
    R: AsyncRead + Unpin,
    H: LineHandler,
{
    pump_async_observed(reader, sink, |_| {}).await
}

/// Like [`pump_async`], calling `observe` after every chunk, including the one
/// a handler rejected.
pub(crate) async fn pump_async_observed<R, H, F>(mut reader: R, sink: &mut LineSink<H>, mut observe: F) -> AppResult<u64>
where
    R: AsyncRead + Unpin,
    H: LineHandler,
    F: FnMut(&LineSink<H>),
{
    let mut chunk = vec![0_u8; CHUNK_SIZE];
    let mut total = 0_u64;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(size) => {
                total = total.saturating_add(size as u64);
                let written = sink.write_block(&chunk[..size]);
                observe(&*sink);
                written?;
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(AppError::Io(format!("failed to read stream: {}", error))),
        }
    }
    let flushed = sink.flush();
    observe(&*sink);
    flushed?;
    Ok(total)
}
