//! Subprocess executor — spawn, capture, time out, kill.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;
use crate::exec::{ExecOutcome, Executor};

/// Maximum captured output before truncation (64KB).
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Executor that shells out to scenario CLIs from a fixed working
/// directory.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    /// Working directory for executors (if None, inherits cwd).
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory for spawned executors.
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ExecOutcome, ExecError> {
        let start = std::time::Instant::now();

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ExecError::SpawnFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let waited = tokio::time::timeout(timeout, async {
            // Drain both pipes while waiting so a chatty executor cannot
            // block on a full pipe buffer.
            let (status, out, err) = tokio::join!(
                child.wait(),
                read_capped(&mut stdout),
                read_capped(&mut stderr),
            );
            status.map(|s| (s, out, err))
        })
        .await;

        match waited {
            Ok(Ok((status, out, err))) => {
                let exit_code = status.code().unwrap_or(-1);
                debug!(command, exit_code, "Executor finished");
                Ok(ExecOutcome {
                    exit_code,
                    output: combine_output(out, err),
                    duration: start.elapsed(),
                })
            }
            Ok(Err(e)) => Err(ExecError::SpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                let _ = child.kill().await;
                Err(ExecError::Timeout {
                    command: command.to_string(),
                    timeout,
                })
            }
        }
    }
}

/// Drain a pipe to EOF, keeping at most `MAX_OUTPUT_SIZE` bytes.
///
/// The pipe must be read to EOF even after the cap is reached, otherwise
/// a chatty child blocks on a full pipe buffer and never exits.
async fn read_capped(pipe: &mut Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let mut scratch = [0u8; 8192];
    loop {
        match pipe.read(&mut scratch).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() < MAX_OUTPUT_SIZE {
                    let keep = n.min(MAX_OUTPUT_SIZE - buf.len());
                    buf.extend_from_slice(&scratch[..keep]);
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn combine_output(stdout: String, stderr: String) -> String {
    if stderr.is_empty() {
        stdout
    } else if stdout.is_empty() {
        stderr
    } else {
        format!("{stdout}\n\n--- stderr ---\n{stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let exec = ProcessExecutor::new();
        let outcome = exec
            .run(
                "sh",
                &["-c".to_string(), "echo hello".to_string()],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(outcome.success());
        assert!(outcome.output.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_ok_with_code() {
        let exec = ProcessExecutor::new();
        let outcome = exec
            .run(
                "sh",
                &["-c".to_string(), "echo broken >&2; exit 3".to_string()],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.output.contains("broken"));
    }

    #[tokio::test]
    async fn output_beyond_cap_is_drained_not_deadlocked() {
        let exec = ProcessExecutor::new();
        // Well past both the capture cap and the kernel pipe buffer.
        let outcome = exec
            .run(
                "sh",
                &[
                    "-c".to_string(),
                    "yes chatty | head -c 300000; exit 0".to_string(),
                ],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.output.len() <= MAX_OUTPUT_SIZE);
        assert!(outcome.output.starts_with("chatty"));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let exec = ProcessExecutor::new();
        let err = exec
            .run(
                "sh",
                &["-c".to_string(), "sleep 10".to_string()],
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let exec = ProcessExecutor::new();
        let err = exec
            .run("definitely-not-a-binary", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::SpawnFailed { .. }));
    }
}
