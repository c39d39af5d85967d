//! Subprocess tool runner

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scanforge_core::domain::Tool;

use crate::domain::services::{RunOutcome, ToolRunner};

/// Runs tools as local subprocesses, capturing stdout/stderr.
///
/// The stop signal is cooperative: the worker future is never aborted, the
/// subprocess is terminated and the job exits uncompleted without touching
/// the result store.
pub struct SubprocessRunner {
    timeout: Duration,
}

impl SubprocessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for SubprocessRunner {
    async fn run(
        &self,
        tool: &Tool,
        arguments: &[String],
        cancel: &CancellationToken,
    ) -> std::io::Result<RunOutcome> {
        let (program, args) = match arguments.split_first() {
            Some(split) => split,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "empty command line",
                ))
            }
        };
        info!(tool = %tool.name, command = %arguments.join(" "), "Tool execution started");

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let capture = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut stdout).await;
            }
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            (stdout, stderr)
        };

        tokio::select! {
            joined = async { tokio::join!(child.wait(), capture) } => {
                let (status, (stdout, stderr)) = joined;
                let status = status?;
                Ok(RunOutcome {
                    success: status.success(),
                    stdout,
                    stderr,
                    cancelled: false,
                })
            }
            _ = cancel.cancelled() => {
                warn!(tool = %tool.name, "Tool execution stopped by cancellation");
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(RunOutcome {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    cancelled: true,
                })
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!(tool = %tool.name, timeout = ?self.timeout, "Tool execution timed out");
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(RunOutcome {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("tool timed out after {:?}", self.timeout),
                    cancelled: false,
                })
            }
        }
    }
}
