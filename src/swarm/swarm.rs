//! Swarm supervisor — spawns the agent pool and owns its lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::sink::SinkHandle;
use crate::store::{TaskFolder, TaskStore};
use crate::swarm::agent::{Agent, AgentContext};
use crate::swarm::registry::spawn_mirror;

/// The running agent pool.
pub struct Swarm {
    ctx: Arc<AgentContext>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Swarm {
    /// Spawn `agent_count` agents plus the registry mirror.
    pub fn start(ctx: Arc<AgentContext>, sink: SinkHandle, agent_count: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = Vec::with_capacity(agent_count + 1);
        for index in 0..agent_count {
            let agent = Agent::new(index, ctx.clone());
            handles.push(tokio::spawn(agent.run(shutdown_rx.clone())));
        }
        handles.push(spawn_mirror(ctx.registry.clone(), sink, shutdown_rx));

        info!(agents = agent_count, "Swarm started");
        Self {
            ctx,
            shutdown_tx,
            handles,
        }
    }

    /// Wake idle agents; call after anything lands in `staged/`.
    pub fn notify_staged(&self) {
        self.ctx.staged_wakeup.notify_waiters();
    }

    /// Cooperative shutdown: agents finish their current task, then exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Swarm task panicked during shutdown");
            }
        }
        info!("Swarm stopped");
    }

    /// Move `active/` entries older than `grace` back to `staged/`.
    ///
    /// For use after a crash left claimed tasks orphaned; an entry still
    /// being worked on within the grace period is left alone. Returns the
    /// recovered task IDs.
    pub async fn recover_stale_active(
        store: &dyn TaskStore,
        grace: Duration,
    ) -> Result<Vec<String>, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut recovered = Vec::new();
        for (_, task) in store.list_folder(TaskFolder::Active).await? {
            let stale = match task.started_at {
                Some(started) => started < cutoff,
                // No started_at stamp at all means the claim died mid-write.
                None => true,
            };
            if !stale {
                continue;
            }
            match store
                .transition(&task.id, TaskFolder::Active, TaskFolder::Staged)
                .await
            {
                Ok(()) => {
                    info!(task_id = %task.id, "Recovered stale active task");
                    recovered.push(task.id);
                }
                Err(StoreError::ClaimLost(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(recovered)
    }
}
