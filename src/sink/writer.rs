//! Fire-and-forget writer in front of the metrics sink.
//!
//! Scheduler and agent hot paths must never wait on the database, so
//! mutations are pushed through a bounded channel. When the channel is
//! full the command is dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::problems::Problem;
use crate::sink::{AgentStatusRow, ConfigEntry, MetricsSink, TaskExecutionRow};

/// A deferred sink mutation.
#[derive(Debug)]
pub enum SinkCommand {
    RecordExecution(TaskExecutionRow),
    UpsertAgent(AgentStatusRow),
    UpsertProblem(Problem),
    SetConfig(ConfigEntry),
    UpsertWeight { weight_type: String, value: f64 },
}

/// Cheap-to-clone handle for submitting sink commands.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkCommand>,
    dropped: Arc<AtomicU64>,
}

impl SinkHandle {
    /// Submit without blocking; drops the command if the channel is full
    /// or the writer has shut down.
    pub fn submit(&self, command: SinkCommand) {
        if let Err(e) = self.tx.try_send(command) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped_total = total, error = %e, "Sink command dropped");
        }
    }

    /// Commands dropped since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawn the writer task that drains commands into the sink.
pub fn spawn_writer(
    sink: Arc<dyn MetricsSink>,
    capacity: usize,
) -> (SinkHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity);
    let handle = SinkHandle {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };

    let task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            let result = match command {
                SinkCommand::RecordExecution(row) => sink.record_execution(&row).await,
                SinkCommand::UpsertAgent(row) => sink.upsert_agent(&row).await,
                SinkCommand::UpsertProblem(problem) => sink.upsert_problem(&problem).await,
                SinkCommand::SetConfig(entry) => sink.set_config(&entry).await,
                SinkCommand::UpsertWeight { weight_type, value } => {
                    sink.upsert_weight(&weight_type, value).await
                }
            };
            if let Err(e) = result {
                // Advisory mirror only; log and keep draining.
                warn!(error = %e, "Sink write failed");
            }
        }
        debug!("Sink writer stopped");
    });

    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LibSqlSink;
    use chrono::Utc;

    fn execution_row(id: &str, status: &str) -> TaskExecutionRow {
        TaskExecutionRow {
            task_id: id.to_string(),
            title: format!("task {id}"),
            task_type: "maintenance".to_string(),
            status: status.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
        }
    }

    #[tokio::test]
    async fn writer_drains_commands_into_sink() {
        let sink = Arc::new(LibSqlSink::new_memory().await.unwrap());
        sink.run_migrations().await.unwrap();

        let (handle, task) = spawn_writer(sink.clone(), 16);
        handle.submit(SinkCommand::RecordExecution(execution_row("t-1", "completed")));
        handle.submit(SinkCommand::UpsertWeight {
            weight_type: "impact".to_string(),
            value: 1.5,
        });
        drop(handle);
        task.await.unwrap();

        let metrics = sink.metrics().await.unwrap();
        assert_eq!(metrics.task_counts.len(), 1);
        assert_eq!(metrics.task_counts[0].status, "completed");
        assert_eq!(metrics.task_counts[0].count, 1);
    }

    #[tokio::test]
    async fn full_channel_drops_and_counts() {
        let sink = Arc::new(LibSqlSink::new_memory().await.unwrap());
        sink.run_migrations().await.unwrap();

        let (tx, rx) = mpsc::channel(1);
        let handle = SinkHandle {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        // Nothing drains `rx`, so the second submit overflows.
        handle.submit(SinkCommand::RecordExecution(execution_row("t-1", "active")));
        handle.submit(SinkCommand::RecordExecution(execution_row("t-2", "active")));
        assert_eq!(handle.dropped_count(), 1);
        drop(rx);
    }
}
