//! Metrics sink — advisory relational mirror of swarm state.
//!
//! The filesystem is authoritative; everything written here powers
//! reporting only. Mutations from the scheduler hot path go through the
//! bounded [`writer::SinkHandle`] so a slow or disconnected sink can
//! never block task execution.

pub mod libsql;
pub mod migrations;
pub mod writer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::problems::{Problem, ProblemStatus};

pub use libsql::LibSqlSink;
pub use writer::{SinkCommand, SinkHandle, spawn_writer};

/// One row in `task_executions`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskExecutionRow {
    pub task_id: String,
    pub title: String,
    pub task_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

/// One row in `agent_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusRow {
    pub agent_id: String,
    pub name: String,
    pub current_task_id: Option<String>,
    pub current_task_title: Option<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    /// Free-form resource usage map, stored as JSON.
    pub resource_usage: serde_json::Value,
}

/// Aggregate metrics for the reporting surface.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmMetrics {
    pub task_counts: Vec<StatusCount>,
    pub avg_duration_seconds: Option<f64>,
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// A tunable configuration row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub setting_type: String,
}

/// Relational mirror of task executions, agents, problems, and tunables.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn run_migrations(&self) -> Result<(), SinkError>;

    // ── Task executions ─────────────────────────────────────────────

    async fn record_execution(&self, row: &TaskExecutionRow) -> Result<(), SinkError>;

    // ── Agents ──────────────────────────────────────────────────────

    /// Upsert keyed by agent ID; refreshes `last_heartbeat`.
    async fn upsert_agent(&self, row: &AgentStatusRow) -> Result<(), SinkError>;

    /// Agents whose heartbeat falls within `window_secs` of now.
    async fn active_agents(&self, window_secs: i64) -> Result<Vec<AgentStatusRow>, SinkError>;

    // ── Problems ────────────────────────────────────────────────────

    /// Upsert keyed by problem ID. `discovered_at` and `tasks_created`
    /// of an existing row are preserved.
    async fn upsert_problem(&self, problem: &Problem) -> Result<(), SinkError>;

    async fn get_problem(&self, id: &str) -> Result<Option<Problem>, SinkError>;

    /// `filter`: all | active | critical | resolved.
    async fn list_problems(&self, filter: &str) -> Result<Vec<Problem>, SinkError>;

    /// Append a spawned task ID to the problem's `tasks_created`.
    async fn link_task(&self, problem_id: &str, task_id: &str) -> Result<(), SinkError>;

    async fn resolve_problem(
        &self,
        id: &str,
        resolution: &str,
        resolved_by: &str,
    ) -> Result<Problem, SinkError>;

    // ── Configuration / weights ─────────────────────────────────────

    async fn set_config(&self, entry: &ConfigEntry) -> Result<(), SinkError>;

    async fn get_config(&self, key: &str) -> Result<Option<ConfigEntry>, SinkError>;

    async fn all_config(&self) -> Result<Vec<ConfigEntry>, SinkError>;

    async fn upsert_weight(&self, weight_type: &str, value: f64) -> Result<(), SinkError>;

    // ── Reporting ───────────────────────────────────────────────────

    async fn metrics(&self) -> Result<SwarmMetrics, SinkError>;

    /// Completed / (completed + failed) over the trailing `days`.
    async fn success_rate(&self, days: i64) -> Result<Option<f64>, SinkError>;
}

/// Status string used in `problems` rows.
pub(crate) fn problem_status_str(status: ProblemStatus) -> &'static str {
    match status {
        ProblemStatus::Active => "active",
        ProblemStatus::Investigating => "investigating",
        ProblemStatus::Resolved => "resolved",
        ProblemStatus::Ignored => "ignored",
    }
}
