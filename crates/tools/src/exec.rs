//! Shell executor: run one command, bounded by a hard deadline.
//!
//! Semantics:
//! - The text goes to `sh -c` verbatim; the server is trusted to send it.
//! - stdout and stderr land in one buffer in the order the child wrote them.
//! - The child leads its own process group.  On timeout the whole group gets
//!   `SIGKILL`, so grandchildren do not outlive the deadline.
//! - If the shell exits but a background child keeps the pipes open past the
//!   deadline, that counts as a timeout too.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use bc_domain::config::ExecConfig;

use crate::output::OutputBuffer;

/// How long readers get to drain after the group was killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// The shell exited on its own (any exit code).
    Finished,
    /// The deadline passed and the process group was killed.
    TimedOut,
    /// The shell could not be started or waited on.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecOutcome {
    /// Correlates the log lines of one execution.
    pub id: String,
    pub status: ExecStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Combined stdout + stderr captured up to completion or the cutoff.
    pub output: String,
    pub output_truncated: bool,
    /// Process group id the command ran in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.status == ExecStatus::Finished && self.exit_code == Some(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs shell commands with a fixed deadline.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    timeout: Duration,
    max_output_chars: usize,
}

impl ShellExecutor {
    pub fn new(config: &ExecConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_output_chars: config.max_output_chars,
        }
    }

    /// Replace the deadline for every command this executor runs.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the command and log the outcome.
    pub async fn execute(&self, command: &str) -> ExecOutcome {
        let outcome = self.run(command).await;
        log_outcome(command, &outcome);
        outcome
    }

    /// Run the command to completion or to the deadline.
    pub async fn run(&self, command: &str) -> ExecOutcome {
        let id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.timeout;

        tracing::debug!(exec_id = %id, command = %command, timeout_secs = self.timeout.as_secs(), "spawning command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ExecOutcome {
                    id,
                    status: ExecStatus::Failed,
                    exit_code: None,
                    output: format!("failed to spawn: {e}"),
                    output_truncated: false,
                    pgid: None,
                    started_at,
                    finished_at: Utc::now(),
                };
            }
        };

        // With process_group(0) the group id equals the child's pid.
        let pgid = child.id();
        let output = Arc::new(Mutex::new(OutputBuffer::new(self.max_output_chars)));
        let stdout_task = spawn_reader(child.stdout.take(), output.clone());
        let stderr_task = spawn_reader(child.stderr.take(), output.clone());

        let (mut status, exit_code) = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(exit)) => (ExecStatus::Finished, exit.code()),
            Ok(Err(e)) => {
                output.lock().push(&format!("\n[process error: {e}]"));
                kill_process_group(&mut child, pgid).await;
                (ExecStatus::Failed, None)
            }
            Err(_) => {
                kill_process_group(&mut child, pgid).await;
                (ExecStatus::TimedOut, None)
            }
        };

        let drain_until = match status {
            ExecStatus::Finished => deadline,
            _ => Instant::now() + DRAIN_GRACE,
        };
        let drained = tokio::time::timeout_at(drain_until, async {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
        })
        .await
        .is_ok();

        if !drained {
            if status == ExecStatus::Finished {
                // The shell is gone but something it started still holds
                // the pipes open.
                kill_group(pgid);
                status = ExecStatus::TimedOut;
            } else {
                tracing::warn!(exec_id = %id, pgid = ?pgid, "output pipes still open after kill");
            }
        }

        let buf = output.lock();
        ExecOutcome {
            id,
            status,
            exit_code,
            output: buf.combined.clone(),
            output_truncated: buf.truncated(),
            pgid,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Copy one pipe into the shared buffer chunk by chunk, so output written
/// before a kill is kept even without a trailing newline.
fn spawn_reader<R>(pipe: Option<R>, output: Arc<Mutex<OutputBuffer>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut buf = [0u8; 4096];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let n = match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            pending.extend_from_slice(&buf[..n]);
            // Hold back an incomplete UTF-8 sequence until the next read.
            let valid = match std::str::from_utf8(&pending) {
                Ok(s) => s.len(),
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                Err(_) => pending.len(),
            };
            let chunk: Vec<u8> = pending.drain(..valid).collect();
            if !chunk.is_empty() {
                output.lock().push(&String::from_utf8_lossy(&chunk));
            }
        }
        if !pending.is_empty() {
            output.lock().push(&String::from_utf8_lossy(&pending));
        }
    })
}

/// Kill the whole group, then reap the shell.
async fn kill_process_group(child: &mut Child, pgid: Option<u32>) {
    kill_group(pgid);
    let _ = child.kill().await;
}

#[cfg(unix)]
fn kill_group(pgid: Option<u32>) {
    let Some(pgid) = pgid else {
        return;
    };
    // SAFETY: kill(2) with a negative pid signals every member of the group
    // created at spawn; it has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) {}

fn log_outcome(command: &str, outcome: &ExecOutcome) {
    let output = outcome.output.trim();
    match outcome.status {
        ExecStatus::Finished if outcome.exit_code == Some(0) => {
            tracing::info!(exec_id = %outcome.id, command = %command, "command finished\n{output}");
        }
        ExecStatus::Finished => {
            tracing::warn!(
                exec_id = %outcome.id,
                command = %command,
                exit_code = ?outcome.exit_code,
                "error executing command\noutput: {output}"
            );
        }
        ExecStatus::TimedOut => {
            tracing::warn!(
                exec_id = %outcome.id,
                command = %command,
                pgid = ?outcome.pgid,
                "command timed out, process group killed\noutput: {output}"
            );
        }
        ExecStatus::Failed => {
            tracing::error!(exec_id = %outcome.id, command = %command, "error executing command: {output}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(timeout: Duration) -> ShellExecutor {
        ShellExecutor::new(&ExecConfig::default()).with_timeout(timeout)
    }

    #[test]
    fn deadline_follows_long_running_toggle() {
        let short = ShellExecutor::new(&ExecConfig::default());
        assert_eq!(short.timeout(), Duration::from_secs(10));

        let long = ShellExecutor::new(&ExecConfig {
            long_running: true,
            ..Default::default()
        });
        assert_eq!(long.timeout(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn echo_captures_output() {
        let out = executor(Duration::from_secs(5)).run("echo hi").await;
        assert_eq!(out.status, ExecStatus::Finished);
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.output, "hi\n");
        assert!(out.success());
    }

    #[tokio::test]
    async fn stderr_is_merged() {
        let out = executor(Duration::from_secs(5))
            .run("echo out; echo err 1>&2")
            .await;
        assert!(out.output.contains("out\n"));
        assert!(out.output.contains("err\n"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_fatal() {
        let out = executor(Duration::from_secs(5))
            .execute("echo broken; exit 3")
            .await;
        assert_eq!(out.status, ExecStatus::Finished);
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.output, "broken\n");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn text_is_passed_to_the_shell_verbatim() {
        let out = executor(Duration::from_secs(5))
            .run("printf '%s|' a 'b c'; echo")
            .await;
        assert_eq!(out.output, "a|b c|\n");
    }

    #[tokio::test]
    async fn environment_is_inherited() {
        let out = executor(Duration::from_secs(5)).run("echo \"$PATH\"").await;
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(out.output.trim_end(), path);
    }

    #[tokio::test]
    async fn timeout_keeps_partial_output() {
        let started = std::time::Instant::now();
        let out = executor(Duration::from_millis(500))
            .execute("printf partial; sleep 30")
            .await;
        assert_eq!(out.status, ExecStatus::TimedOut);
        assert_eq!(out.exit_code, None);
        assert_eq!(out.output, "partial");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn background_child_holding_pipes_times_out() {
        let started = std::time::Instant::now();
        let out = executor(Duration::from_millis(500))
            .run("sleep 30 & echo started")
            .await;
        assert_eq!(out.status, ExecStatus::TimedOut);
        assert!(out.output.contains("started"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
