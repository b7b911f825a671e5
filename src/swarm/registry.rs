//! In-process agent registry — heartbeats and current assignments.
//!
//! The registry is the authoritative liveness view; the metrics sink
//! carries an advisory mirror refreshed by a background supervisor.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::sink::{AgentStatusRow, SinkCommand, SinkHandle};

/// How often the registry is mirrored into the sink.
const MIRROR_INTERVAL: Duration = Duration::from_secs(30);

/// What an agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Working,
    Analyzing,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Working => "working",
            AgentState::Analyzing => "analyzing",
        }
    }
}

/// One agent's registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    pub state: AgentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_title: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl AgentInfo {
    fn new(agent_id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            agent_id,
            name,
            state: AgentState::Idle,
            current_task_id: None,
            current_task_title: None,
            started_at: now,
            last_heartbeat: now,
            tasks_completed: 0,
            tasks_failed: 0,
        }
    }

    fn to_row(&self) -> AgentStatusRow {
        AgentStatusRow {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            current_task_id: self.current_task_id.clone(),
            current_task_title: self.current_task_title.clone(),
            status: self.state.as_str().to_string(),
            started_at: self.started_at,
            last_heartbeat: self.last_heartbeat,
            resource_usage: serde_json::json!({
                "tasks_completed": self.tasks_completed,
                "tasks_failed": self.tasks_failed,
            }),
        }
    }
}

/// Shared registry of live agents.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentInfo>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any stale entry under the same ID.
    pub fn register(&self, agent_id: &str, name: &str) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.insert(
            agent_id.to_string(),
            AgentInfo::new(agent_id.to_string(), name.to_string()),
        );
    }

    /// Refresh an agent's heartbeat and state.
    pub fn heartbeat(
        &self,
        agent_id: &str,
        state: AgentState,
        task: Option<(&str, &str)>,
    ) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = agents.get_mut(agent_id) {
            info.last_heartbeat = Utc::now();
            info.state = state;
            info.current_task_id = task.map(|(id, _)| id.to_string());
            info.current_task_title = task.map(|(_, title)| title.to_string());
        }
    }

    /// Bump an agent's completion or failure counter.
    pub fn record_outcome(&self, agent_id: &str, success: bool) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = agents.get_mut(agent_id) {
            if success {
                info.tasks_completed += 1;
            } else {
                info.tasks_failed += 1;
            }
        }
    }

    /// Snapshot of all registered agents, sorted by ID for stable output.
    pub fn snapshot(&self) -> Vec<AgentInfo> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<AgentInfo> = agents.values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }
}

/// Spawn the supervisor that mirrors the registry into the sink every
/// 30 seconds until `shutdown` flips.
pub fn spawn_mirror(
    registry: Arc<AgentRegistry>,
    sink: SinkHandle,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MIRROR_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for info in registry.snapshot() {
                        sink.submit(SinkCommand::UpsertAgent(info.to_row()));
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Registry mirror stopping");
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_heartbeat_round_trip() {
        let registry = AgentRegistry::new();
        registry.register("agent-1", "agent-1");
        registry.heartbeat("agent-1", AgentState::Working, Some(("t-9", "Fix leak")));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, AgentState::Working);
        assert_eq!(snapshot[0].current_task_id.as_deref(), Some("t-9"));
        assert_eq!(snapshot[0].current_task_title.as_deref(), Some("Fix leak"));
    }

    #[test]
    fn idle_heartbeat_clears_assignment() {
        let registry = AgentRegistry::new();
        registry.register("agent-1", "agent-1");
        registry.heartbeat("agent-1", AgentState::Working, Some(("t-9", "Fix leak")));
        registry.heartbeat("agent-1", AgentState::Idle, None);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].state, AgentState::Idle);
        assert!(snapshot[0].current_task_id.is_none());
    }

    #[test]
    fn outcome_counters_accumulate() {
        let registry = AgentRegistry::new();
        registry.register("agent-1", "agent-1");
        registry.record_outcome("agent-1", true);
        registry.record_outcome("agent-1", true);
        registry.record_outcome("agent-1", false);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].tasks_completed, 2);
        assert_eq!(snapshot[0].tasks_failed, 1);
    }

    #[test]
    fn snapshot_is_sorted_by_id() {
        let registry = AgentRegistry::new();
        registry.register("agent-2", "agent-2");
        registry.register("agent-1", "agent-1");
        let ids: Vec<_> = registry.snapshot().into_iter().map(|a| a.agent_id).collect();
        assert_eq!(ids, vec!["agent-1", "agent-2"]);
    }
}
