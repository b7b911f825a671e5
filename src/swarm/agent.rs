//! Worker agent — claims staged tasks and runs them to disposition.
//!
//! Claiming is a rename from `staged/` to `active/`; losing that rename
//! race is normal operation and the agent just polls again. A claimed
//! task always ends in `completed/` or `failed/`, never back in staged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::events::{Event, EventKind, EventLog};
use crate::exec::{Executor, invocation_args};
use crate::prompts;
use crate::scenario::ScenarioRegistry;
use crate::sink::{SinkCommand, SinkHandle, TaskExecutionRow};
use crate::store::{Task, TaskFolder, TaskStore};
use crate::swarm::registry::{AgentRegistry, AgentState};

/// Dependencies shared by every agent in the swarm.
pub struct AgentContext {
    pub store: Arc<dyn TaskStore>,
    pub executor: Arc<dyn Executor>,
    pub scenarios: Arc<ScenarioRegistry>,
    pub registry: Arc<AgentRegistry>,
    pub events: EventLog,
    pub sink: SinkHandle,
    pub prompts_dir: std::path::PathBuf,
    pub execution_timeout: Duration,
    pub poll_interval: Duration,
    /// Woken whenever a task lands in `staged/`.
    pub staged_wakeup: Arc<Notify>,
}

/// One worker in the swarm.
pub struct Agent {
    id: String,
    ctx: Arc<AgentContext>,
}

impl Agent {
    pub fn new(index: usize, ctx: Arc<AgentContext>) -> Self {
        let id = format!("agent-{index}");
        ctx.registry.register(&id, &id);
        Self { id, ctx }
    }

    /// Run until shutdown. Each pass claims at most one task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(agent = %self.id, "Agent started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let worked = match self.claim_and_execute().await {
                Ok(worked) => worked,
                Err(e) => {
                    warn!(agent = %self.id, error = %e, "Agent pass failed");
                    false
                }
            };
            if worked {
                // Go straight back for the next staged task.
                continue;
            }
            self.ctx
                .registry
                .heartbeat(&self.id, AgentState::Idle, None);
            tokio::select! {
                _ = self.ctx.staged_wakeup.notified() => {}
                _ = tokio::time::sleep(self.ctx.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!(agent = %self.id, "Agent stopped");
    }

    /// Try to claim and run one staged task. Returns whether work was done.
    async fn claim_and_execute(&self) -> Result<bool, StoreError> {
        let staged = self.ctx.store.list_folder(TaskFolder::Staged).await?;
        let Some((file_name, task)) = pick_next(staged) else {
            return Ok(false);
        };

        match self
            .ctx
            .store
            .transition(&task.id, TaskFolder::Staged, TaskFolder::Active)
            .await
        {
            Ok(()) => {}
            Err(StoreError::ClaimLost(_)) => {
                // Another agent won the rename; nothing to clean up.
                debug!(agent = %self.id, task_id = %task.id, "Claim lost");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        debug!(agent = %self.id, task_id = %task.id, file = %file_name, "Task claimed");

        self.execute_claimed(task).await;
        Ok(true)
    }

    /// Run a claimed task to disposition. The task is in `active/` on
    /// entry and in `completed/` or `failed/` on exit.
    async fn execute_claimed(&self, mut task: Task) {
        let ctx = &self.ctx;
        task.started_at = Some(Utc::now());
        if let Err(e) = ctx.store.write_in_place(&task, TaskFolder::Active).await {
            warn!(task_id = %task.id, error = %e, "Failed to stamp started_at");
        }

        ctx.registry.heartbeat(
            &self.id,
            AgentState::Working,
            Some((&task.id, &task.title)),
        );

        let selected = ctx.scenarios.select(&task);
        ctx.events
            .append(Event::start(EventKind::Execution, &task.id).with_scenario(&selected.name))
            .await;
        info!(
            agent = %self.id,
            task_id = %task.id,
            scenario = %selected.name,
            "Executing task"
        );

        let prompt = prompts::render(&ctx.prompts_dir, prompts::EXECUTOR_TEMPLATE, &task).await;
        let args = invocation_args(&task.id, &prompt);
        let run_started = std::time::Instant::now();
        let result = ctx
            .executor
            .run(&selected.command, &args, ctx.execution_timeout)
            .await;
        let elapsed = run_started.elapsed();

        let (success, finish) = match &result {
            Ok(outcome) if outcome.success() => {
                task.completed_at = Some(Utc::now());
                (
                    true,
                    Event::finish(EventKind::Execution, &task.id)
                        .with_exit_code(outcome.exit_code)
                        .with_duration(outcome.duration)
                        .with_scenario(&selected.name),
                )
            }
            Ok(outcome) => {
                task.record_attempt(Some(format!(
                    "{} exited with code {}",
                    selected.command, outcome.exit_code
                )));
                task.failed_at = Some(Utc::now());
                (
                    false,
                    Event::finish(EventKind::Execution, &task.id)
                        .with_exit_code(outcome.exit_code)
                        .with_duration(outcome.duration)
                        .with_scenario(&selected.name)
                        .with_error(format!("exit code {}", outcome.exit_code)),
                )
            }
            Err(e) => {
                task.record_attempt(Some(e.to_string()));
                task.failed_at = Some(Utc::now());
                let mut event = Event::finish(EventKind::Execution, &task.id)
                    .with_duration(elapsed)
                    .with_scenario(&selected.name)
                    .with_error(e.to_string());
                if let Some(code) = e.exit_code() {
                    event = event.with_exit_code(code);
                }
                (false, event)
            }
        };

        let destination = if success {
            TaskFolder::Completed
        } else {
            TaskFolder::Failed
        };
        if let Err(e) = ctx.store.write_in_place(&task, TaskFolder::Active).await {
            warn!(task_id = %task.id, error = %e, "Failed to stamp disposition");
        }
        if let Err(e) = ctx
            .store
            .transition(&task.id, TaskFolder::Active, destination)
            .await
        {
            warn!(task_id = %task.id, error = %e, "Failed to move task to disposition folder");
        }

        ctx.events.append(finish).await;
        ctx.registry.record_outcome(&self.id, success);
        ctx.sink.submit(SinkCommand::RecordExecution(TaskExecutionRow {
            task_id: task.id.clone(),
            title: task.title.clone(),
            task_type: task.task_type.clone(),
            status: destination.status_label().to_string(),
            created_at: task.created_at,
            completed_at: task.completed_at.or(task.failed_at),
            duration_seconds: result.as_ref().ok().map(|o| o.duration.as_secs_f64()),
        }));

        info!(
            agent = %self.id,
            task_id = %task.id,
            status = destination.status_label(),
            "Task finished"
        );
    }
}

/// Pick the highest-priority staged task. Tasks without a score count as
/// 0; equal scores break lexicographically by file name so every agent
/// agrees on the order.
pub(crate) fn pick_next(mut staged: Vec<(String, Task)>) -> Option<(String, Task)> {
    staged.sort_by(|(a_name, a), (b_name, b)| {
        let a_score = a.priority_score.unwrap_or(0.0);
        let b_score = b.priority_score.unwrap_or(0.0);
        b_score
            .partial_cmp(&a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_name.cmp(b_name))
    });
    staged.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(name: &str, score: Option<f64>) -> (String, Task) {
        let mut task = Task::new(name, "api");
        task.priority_score = score;
        (format!("{name}.yaml"), task)
    }

    #[test]
    fn picks_highest_score() {
        let picked = pick_next(vec![
            scored("low", Some(1.0)),
            scored("high", Some(9.0)),
            scored("mid", Some(4.0)),
        ])
        .unwrap();
        assert_eq!(picked.0, "high.yaml");
    }

    #[test]
    fn unscored_counts_as_zero() {
        let picked = pick_next(vec![scored("unscored", None), scored("tiny", Some(0.1))]).unwrap();
        assert_eq!(picked.0, "tiny.yaml");
    }

    #[test]
    fn ties_break_lexicographically() {
        let picked = pick_next(vec![
            scored("bbb", Some(5.0)),
            scored("aaa", Some(5.0)),
            scored("ccc", Some(5.0)),
        ])
        .unwrap();
        assert_eq!(picked.0, "aaa.yaml");
    }

    #[test]
    fn empty_staged_yields_none() {
        assert!(pick_next(Vec::new()).is_none());
    }
}
