use crate::config::{RunOptions, SinkOptions};
use crate::errors::{AppError, AppResult};
use crate::pump::pump_async_observed;
use crate::sink::{LineHandler, LineSink, TracingHandler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::Level;

/// How long stream tasks may keep draining once the deadline has passed.
const STREAM_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub bytes: u64,
    pub lines: u64,
    pub overflowed_bytes: u64,
    /// The stream was still open when the run gave up on it, so the counts
    /// only cover what arrived before that point.
    #[serde(default)]
    pub abandoned: bool,
}

#[derive(Debug, Default)]
struct StreamCounters {
    bytes: AtomicU64,
    lines: AtomicU64,
    overflowed_bytes: AtomicU64,
}

impl StreamCounters {
    fn record<H: LineHandler>(&self, sink: &LineSink<H>) {
        self.bytes.store(sink.bytes_written(), Ordering::Relaxed);
        self.lines.store(sink.lines_emitted(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> StreamStats {
        StreamStats {
            bytes: self.bytes.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            overflowed_bytes: self.overflowed_bytes.load(Ordering::Relaxed),
            abandoned: false,
        }
    }
}

struct StreamTask {
    name: &'static str,
    handle: JoinHandle<AppResult<()>>,
    counters: Arc<StreamCounters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: StreamStats,
    pub stderr: StreamStats,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs `spec` with stdout and stderr each drained into their own [`LineSink`].
///
/// Handler failures are reported once the process has exited; the remaining
/// output of that stream is discarded so the child never blocks on a full pipe.
///
/// The timeout bounds the whole call. Streams held open by a surviving
/// grandchild get a short grace period after the deadline and are then
/// abandoned with whatever counts they had reached.
pub async fn run_logged<O, E>(spec: &CommandSpec, options: &RunOptions, stdout: O, stderr: E) -> AppResult<RunOutcome>
where
    O: LineHandler + Send + 'static,
    E: LineHandler + Send + 'static,
{
    options.validate()?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .map_err(|error| AppError::Io(format!("failed to spawn process: {}", error)))?;
    tracing::debug!(program = %spec.program, pid = ?child.id(), "spawned process");

    let stdout_task = child
        .stdout
        .take()
        .map(|stream| drain_stream(stream, stdout, "stdout", options.sink));
    let stderr_task = child
        .stderr
        .take()
        .map(|stream| drain_stream(stream, stderr, "stderr", options.sink));

    // Absurdly large timeouts overflow the clock; treat them as no deadline.
    let deadline = tokio::time::Instant::now().checked_add(Duration::from_secs(options.timeout_seconds));
    let poll_interval = Duration::from_millis(options.poll_interval_ms);
    let mut timed_out = false;
    let exit_code = loop {
        if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
            tracing::warn!(
                program = %spec.program,
                timeout_seconds = options.timeout_seconds,
                "process timed out; killing"
            );
            child
                .kill()
                .await
                .map_err(|error| AppError::Io(format!("failed to kill process: {}", error)))?;
            timed_out = true;
            break None;
        }

        let status = child
            .try_wait()
            .map_err(|error| AppError::Io(format!("failed to poll process status: {}", error)))?;
        if let Some(status) = status {
            break status.code();
        }

        tokio::time::sleep(poll_interval).await;
    };
    tracing::debug!(program = %spec.program, exit_code = ?exit_code, timed_out, "process finished");

    let now = tokio::time::Instant::now();
    let join_deadline = if timed_out {
        Some(now + STREAM_GRACE)
    } else {
        deadline.map(|deadline| deadline.max(now + STREAM_GRACE))
    };
    let stdout = join_stream(stdout_task, join_deadline).await?;
    let stderr = join_stream(stderr_task, join_deadline).await?;

    Ok(RunOutcome {
        exit_code,
        timed_out,
        stdout,
        stderr,
    })
}

/// Runs `spec`, logging stdout lines at `info` and stderr lines at `warn`.
pub async fn run_traced(spec: &CommandSpec, options: &RunOptions) -> AppResult<RunOutcome> {
    let stdout = TracingHandler::new("stdout", Level::INFO).with_strip_ansi(options.strip_ansi);
    let stderr = TracingHandler::new("stderr", Level::WARN).with_strip_ansi(options.strip_ansi);
    run_logged(spec, options, stdout, stderr).await
}

fn drain_stream<R, H>(stream: R, handler: H, stream_name: &'static str, options: SinkOptions) -> StreamTask
where
    R: AsyncRead + Unpin + Send + 'static,
    H: LineHandler + Send + 'static,
{
    let counters = Arc::new(StreamCounters::default());
    let task_counters = counters.clone();
    let handle = tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut sink = LineSink::with_options(handler, options);
        let pumped = pump_async_observed(&mut reader, &mut sink, |sink| task_counters.record(sink)).await;
        if let Err(error) = &pumped {
            tracing::warn!(stream = stream_name, error = %error, "stream drain stopped early");
            match tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                Ok(discarded) => {
                    tracing::debug!(stream = stream_name, bytes = discarded, "discarded remaining output")
                }
                Err(error) => {
                    tracing::warn!(stream = stream_name, error = %error, "failed to discard remaining output")
                }
            }
        }
        let closed = sink.close();
        task_counters.record(&sink);

        let overflowed_bytes = sink.take_overflowed_bytes() as u64;
        if overflowed_bytes > 0 {
            tracing::warn!(stream = stream_name, bytes = overflowed_bytes, "long line trimmed");
        }
        task_counters.overflowed_bytes.store(overflowed_bytes, Ordering::Relaxed);

        pumped?;
        closed?;
        Ok(())
    });

    StreamTask {
        name: stream_name,
        handle,
        counters,
    }
}

async fn join_stream(task: Option<StreamTask>, deadline: Option<tokio::time::Instant>) -> AppResult<StreamStats> {
    let Some(mut task) = task else {
        return Ok(StreamStats::default());
    };

    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, &mut task.handle).await {
            Ok(joined) => joined,
            Err(_) => {
                task.handle.abort();
                tracing::warn!(stream = task.name, "stream still open after deadline; abandoning it");
                let mut stats = task.counters.snapshot();
                stats.abandoned = true;
                return Ok(stats);
            }
        },
        None => (&mut task.handle).await,
    };

    joined.map_err(|error| AppError::Internal(format!("stream task failed: {}", error)))??;
    Ok(task.counters.snapshot())
}
