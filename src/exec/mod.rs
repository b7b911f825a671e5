//! External executor seam.
//!
//! Scenario executors are CLIs on PATH. The trait exists so the swarm and
//! analyzer can run against a deterministic fake in tests.

pub mod process;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;

pub use process::ProcessExecutor;

/// Outcome of a finished executor process.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// Process exit code (0 = success).
    pub exit_code: i32,
    /// Combined stdout/stderr, truncated.
    pub output: String,
    /// Wall-clock run time.
    pub duration: Duration,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external scenario executors.
///
/// `run` returns `Ok` for any process that started and exited, whatever
/// the exit code; `Err` covers spawn failures and timeouts.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ExecOutcome, ExecError>;
}

/// The uniform argument shape for scenario invocations:
/// `<cmd> run --task-id <id> --prompt <text>`.
pub fn invocation_args(task_id: &str, prompt: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "--task-id".to_string(),
        task_id.to_string(),
        "--prompt".to_string(),
        prompt.to_string(),
    ]
}
