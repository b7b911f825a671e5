//! Task analyzer — enriches a task's priority estimates in place.
//!
//! Analysis delegates to an external executor with the analyzer prompt;
//! the executor writes estimates into the task document, then we reload
//! it, stamp `analyzed_at`, and derive the priority score. Analysis never
//! moves a task between folders.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, ExecError};
use crate::events::{Event, EventKind, EventLog};
use crate::exec::{Executor, invocation_args};
use crate::priority::{self, WeightsHandle};
use crate::prompts;
use crate::store::{Task, TaskStore};

pub struct TaskAnalyzer {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn Executor>,
    weights: Arc<WeightsHandle>,
    events: EventLog,
    /// Executor command the analysis prompt is fed to.
    command: String,
    prompts_dir: PathBuf,
    timeout: Duration,
}

impl TaskAnalyzer {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn Executor>,
        weights: Arc<WeightsHandle>,
        events: EventLog,
        command: impl Into<String>,
        prompts_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            weights,
            events,
            command: command.into(),
            prompts_dir: prompts_dir.into(),
            timeout,
        }
    }

    /// Analyze one task: run the analyzer prompt, then stamp `analyzed_at`
    /// and recompute `priority_score` from whatever estimates now sit in
    /// the document.
    pub async fn analyze(&self, id: &str) -> Result<Task, Error> {
        let (task, _) = self.store.load(id).await?;
        self.events
            .append(Event::start(EventKind::Analysis, &task.id))
            .await;

        let prompt = prompts::render(&self.prompts_dir, prompts::ANALYZER_TEMPLATE, &task).await;
        let args = invocation_args(&task.id, &prompt);

        let outcome = match self.executor.run(&self.command, &args, self.timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.events
                    .append(
                        Event::finish(EventKind::Analysis, &task.id)
                            .with_error(e.to_string()),
                    )
                    .await;
                return Err(Error::Exec(e));
            }
        };

        if !outcome.success() {
            let error = ExecError::NonZeroExit {
                command: self.command.clone(),
                exit_code: outcome.exit_code,
            };
            warn!(task_id = %task.id, exit_code = outcome.exit_code, "Analysis executor failed");
            self.events
                .append(
                    Event::finish(EventKind::Analysis, &task.id)
                        .with_exit_code(outcome.exit_code)
                        .with_duration(outcome.duration)
                        .with_error(error.to_string()),
                )
                .await;
            return Err(Error::Exec(error));
        }

        // The executor may have rewritten the document; pick up whatever
        // estimates it left behind.
        let (mut task, folder) = self.store.load(id).await?;
        task.analyzed_at = Some(Utc::now());
        task.priority_score = Some(priority::score(&task.priority, &self.weights.snapshot()));
        self.store.write_in_place(&task, folder).await?;

        self.events
            .append(
                Event::finish(EventKind::Analysis, &task.id)
                    .with_exit_code(outcome.exit_code)
                    .with_duration(outcome.duration),
            )
            .await;
        info!(
            task_id = %task.id,
            score = task.priority_score,
            "Task analyzed"
        );
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecOutcome;
    use crate::priority::PriorityWeights;
    use crate::store::task::{PriorityEstimates, TaskFolder, Urgency};
    use crate::store::{FsTaskStore, TaskPatch};
    use async_trait::async_trait;

    struct FixedExecutor {
        exit_code: i32,
    }

    #[async_trait]
    impl Executor for FixedExecutor {
        async fn run(
            &self,
            _command: &str,
            _args: &[String],
            _timeout: Duration,
        ) -> Result<ExecOutcome, ExecError> {
            Ok(ExecOutcome {
                exit_code: self.exit_code,
                output: String::new(),
                duration: Duration::from_millis(5),
            })
        }
    }

    async fn analyzer_over(
        dir: &tempfile::TempDir,
        exit_code: i32,
    ) -> (Arc<FsTaskStore>, TaskAnalyzer) {
        let store = Arc::new(FsTaskStore::bootstrap(dir.path().join("tasks")).await.unwrap());
        let analyzer = TaskAnalyzer::new(
            store.clone(),
            Arc::new(FixedExecutor { exit_code }),
            Arc::new(WeightsHandle::new(PriorityWeights::default())),
            EventLog::new(dir.path().join("events.ndjson")),
            "claude-code",
            dir.path().join("prompts"),
            Duration::from_secs(5),
        );
        (store, analyzer)
    }

    #[tokio::test]
    async fn analysis_stamps_and_scores_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let (store, analyzer) = analyzer_over(&dir, 0).await;

        let task = store
            .create(Task::new("Fix leak", "api").with_estimates(PriorityEstimates {
                impact: Some(8.0),
                urgency: Some(Urgency::High),
                success_prob: Some(0.6),
                resource_cost: None,
                cooldown_hours: None,
            }))
            .await
            .unwrap();

        let analyzed = analyzer.analyze(&task.id).await.unwrap();
        assert!(analyzed.analyzed_at.is_some());
        let expected = 8.0 * 3.0 * 0.6 / 2.0; // cost absent -> moderate anchor
        assert!((analyzed.priority_score.unwrap() - expected).abs() < 1e-9);

        // Still in the same folder.
        let (_, folder) = store.load(&task.id).await.unwrap();
        assert_eq!(folder, TaskFolder::BacklogManual);
    }

    #[tokio::test]
    async fn failed_analysis_leaves_task_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (store, analyzer) = analyzer_over(&dir, 3).await;

        let task = store.create(Task::new("Fix leak", "api")).await.unwrap();
        let err = analyzer.analyze(&task.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Exec(ExecError::NonZeroExit { exit_code: 3, .. })
        ));

        let (loaded, _) = store.load(&task.id).await.unwrap();
        assert!(loaded.analyzed_at.is_none());
        assert!(loaded.priority_score.is_none());

        let events = EventLog::new(dir.path().join("events.ndjson")).read_all().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].error.is_some());
        assert_eq!(events[1].exit_code, Some(3));
    }

    #[tokio::test]
    async fn analysis_picks_up_executor_edits() {
        let dir = tempfile::tempdir().unwrap();
        let (store, analyzer) = analyzer_over(&dir, 0).await;

        // Stand-in for the executor editing the document between the run
        // and the reload: estimates already present on disk.
        let task = store.create(Task::new("Tune cache", "api")).await.unwrap();
        store
            .update(
                &task.id,
                &TaskPatch {
                    description: Some("warm the cache".to_string()),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();

        let analyzed = analyzer.analyze(&task.id).await.unwrap();
        // No estimates -> anchors: 5.0 * 2.0 * 0.5 / 2.0 = 2.5
        assert!((analyzed.priority_score.unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(analyzed.description, "warm the cache");
    }
}
