use crate::error::StreamGrabError;
use crate::invoker::{FetchProcess, OutputTail, ToolInvoker};
use crate::progress;
use crate::types::Task;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs one task's fetch and streams its output through the callbacks.
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    invoker: Arc<ToolInvoker>,
}

/// Reads a pipe as `\n`-terminated byte segments, tolerating invalid UTF-8.
struct LineStream<R> {
    segments: tokio::io::Split<BufReader<R>>,
    open: bool,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    fn new(reader: R) -> Self {
        Self {
            segments: BufReader::new(reader).split(b'\n'),
            open: true,
        }
    }

    async fn next(&mut self) -> Option<String> {
        match self.segments.next_segment().await {
            Ok(Some(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Ok(None) => {
                self.open = false;
                None
            }
            Err(e) => {
                warn!(error = %e, "Tool output stream failed");
                self.open = false;
                None
            }
        }
    }
}

struct Sinks<'a, P, L> {
    on_progress: &'a mut P,
    on_log: &'a mut L,
    tail: OutputTail,
}

impl<P: FnMut(u8), L: FnMut(&str)> Sinks<'_, P, L> {
    /// yt-dlp redraws progress with `\r`, so each carriage-return segment counts as a line.
    fn forward(&mut self, raw: &str) {
        for segment in raw.split('\r') {
            let line = segment.trim();
            if line.is_empty() {
                continue;
            }
            debug!(line, "yt-dlp");
            (self.on_log)(line);
            if let Some(percent) = progress::parse(line) {
                (self.on_progress)(percent);
            }
            self.tail.push(line);
        }
    }
}

impl DownloadExecutor {
    pub fn new(invoker: Arc<ToolInvoker>) -> Self {
        Self { invoker }
    }

    /// Blocks until the child exits. Progress and log callbacks fire in the
    /// order lines arrive on each pipe; nothing fires after this returns.
    pub async fn run<P, L>(
        &self,
        task: &Task,
        mut on_progress: P,
        mut on_log: L,
        cancel: &CancellationToken,
    ) -> Result<(), StreamGrabError>
    where
        P: FnMut(u8),
        L: FnMut(&str),
    {
        if cancel.is_cancelled() {
            return Err(StreamGrabError::Cancelled {
                url: task.url().to_string(),
            });
        }

        let FetchProcess { mut child, command } = self.invoker.spawn_fetch(task)?;
        info!(task_id = %task.id(), url = task.url(), mode = %task.mode(), "Download started");

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                kill_child(&mut child, task).await;
                return Err(StreamGrabError::SpawnFailed {
                    program: self.invoker.program(),
                    cause: "output pipes were not captured".to_string(),
                });
            }
        };

        let mut out = LineStream::new(stdout);
        let mut err = LineStream::new(stderr);
        let mut sinks = Sinks {
            on_progress: &mut on_progress,
            on_log: &mut on_log,
            tail: OutputTail::new(self.invoker.tail_lines()),
        };

        while out.open || err.open {
            tokio::select! {
                line = out.next(), if out.open => {
                    if let Some(line) = line {
                        sinks.forward(&line);
                    }
                }
                line = err.next(), if err.open => {
                    if let Some(line) = line {
                        sinks.forward(&line);
                    }
                }
                _ = cancel.cancelled() => {
                    kill_child(&mut child, task).await;
                    return Err(StreamGrabError::Cancelled { url: task.url().to_string() });
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                kill_child(&mut child, task).await;
                return Err(StreamGrabError::Cancelled { url: task.url().to_string() });
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                sinks.tail.push(&format!("failed to wait for process: {}", e));
                return Err(StreamGrabError::ExecutionFailed {
                    exit_code: None,
                    args: command,
                    last_lines: sinks.tail.into_lines(),
                });
            }
        };

        if status.success() {
            (sinks.on_log)(&format!("Download completed: {}", task.url()));
            info!(task_id = %task.id(), url = task.url(), "Download completed");
            Ok(())
        } else {
            warn!(
                task_id = %task.id(),
                url = task.url(),
                exit_code = ?status.code(),
                "Download exited with failure"
            );
            Err(StreamGrabError::ExecutionFailed {
                exit_code: status.code(),
                args: command,
                last_lines: sinks.tail.into_lines(),
            })
        }
    }
}

async fn kill_child(child: &mut Child, task: &Task) {
    info!(task_id = %task.id(), url = task.url(), "Terminating download process");
    if let Err(e) = child.kill().await {
        warn!(task_id = %task.id(), error = %e, "Failed to terminate download process");
    }
}
