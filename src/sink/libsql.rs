//! libSQL backend — async `MetricsSink` implementation.
//!
//! Supports a local database file or in-memory databases for tests.
//! Collection-valued problem columns are stored as JSON strings.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::SinkError;
use crate::problems::{Frequency, Problem, ProblemImpact, ProblemStatus, Severity};
use crate::sink::{
    AgentStatusRow, ConfigEntry, MetricsSink, StatusCount, SwarmMetrics, TaskExecutionRow,
    migrations, problem_status_str,
};

/// libSQL metrics sink.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlSink {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlSink {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SinkError::Connection(format!("Failed to create db directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SinkError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| SinkError::Connection(format!("Failed to create connection: {e}")))?;

        let sink = Self {
            db: Arc::new(db),
            conn,
        };
        sink.run_migrations().await?;
        info!(path = %path.display(), "Metrics sink opened");
        Ok(sink)
    }

    /// Create an in-memory sink (for tests).
    pub async fn new_memory() -> Result<Self, SinkError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| SinkError::Connection(format!("Failed to create in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| SinkError::Connection(format!("Failed to create connection: {e}")))?;

        let sink = Self {
            db: Arc::new(db),
            conn,
        };
        sink.run_migrations().await?;
        Ok(sink)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: libsql::Error) -> SinkError {
    SinkError::Query(e.to_string())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn str_to_problem_status(s: &str) -> ProblemStatus {
    match s {
        "investigating" => ProblemStatus::Investigating,
        "resolved" => ProblemStatus::Resolved,
        "ignored" => ProblemStatus::Ignored,
        _ => ProblemStatus::Active,
    }
}

fn impact_str(impact: ProblemImpact) -> &'static str {
    match impact {
        ProblemImpact::SystemDown => "system_down",
        ProblemImpact::DegradedPerformance => "degraded_performance",
        ProblemImpact::UserImpact => "user_impact",
        ProblemImpact::Cosmetic => "cosmetic",
    }
}

fn frequency_str(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Constant => "constant",
        Frequency::Frequent => "frequent",
        Frequency::Occasional => "occasional",
        Frequency::Rare => "rare",
    }
}

/// Column order shared by every problems SELECT.
const PROBLEM_COLUMNS: &str = "id, title, description, severity, frequency, impact, status, \
     discovered_at, discovered_by, last_occurrence, resolved_at, resolved_by, resolution, \
     source_file, affected_components, symptoms, evidence, related_issues, tasks_created";

fn row_to_problem(row: &libsql::Row) -> Result<Problem, libsql::Error> {
    Ok(Problem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        severity: Severity::parse_str(&row.get::<String>(3)?),
        frequency: Frequency::parse_str(&row.get::<String>(4)?),
        impact: ProblemImpact::parse_str(&row.get::<String>(5)?),
        status: str_to_problem_status(&row.get::<String>(6)?),
        discovered_at: parse_datetime(&row.get::<String>(7)?),
        discovered_by: row.get(8)?,
        last_occurrence: parse_optional_datetime(row.get(9).ok()),
        resolved_at: parse_optional_datetime(row.get(10).ok()),
        resolved_by: row.get(11).ok(),
        resolution: row.get(12).ok(),
        source_file: row.get(13)?,
        affected_components: json_list(&row.get::<String>(14)?),
        symptoms: json_list(&row.get::<String>(15)?),
        evidence: serde_json::from_str(&row.get::<String>(16)?).unwrap_or_default(),
        related_issues: json_list(&row.get::<String>(17)?),
        tasks_created: json_list(&row.get::<String>(18)?),
    })
}

fn row_to_agent(row: &libsql::Row) -> Result<AgentStatusRow, libsql::Error> {
    Ok(AgentStatusRow {
        agent_id: row.get(0)?,
        name: row.get(1)?,
        current_task_id: row.get(2).ok(),
        current_task_title: row.get(3).ok(),
        status: row.get(4)?,
        started_at: parse_datetime(&row.get::<String>(5)?),
        last_heartbeat: parse_datetime(&row.get::<String>(6)?),
        resource_usage: serde_json::from_str(&row.get::<String>(7)?)
            .unwrap_or(serde_json::Value::Null),
    })
}

#[async_trait]
impl MetricsSink for LibSqlSink {
    async fn run_migrations(&self) -> Result<(), SinkError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn record_execution(&self, row: &TaskExecutionRow) -> Result<(), SinkError> {
        self.conn()
            .execute(
                "INSERT INTO task_executions
                     (task_id, title, task_type, status, created_at, completed_at, duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(task_id) DO UPDATE SET
                     title = excluded.title,
                     task_type = excluded.task_type,
                     status = excluded.status,
                     completed_at = excluded.completed_at,
                     duration_seconds = excluded.duration_seconds",
                params![
                    row.task_id.as_str(),
                    row.title.as_str(),
                    row.task_type.as_str(),
                    row.status.as_str(),
                    row.created_at.to_rfc3339(),
                    row.completed_at.map(|t| t.to_rfc3339()),
                    row.duration_seconds,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn upsert_agent(&self, row: &AgentStatusRow) -> Result<(), SinkError> {
        self.conn()
            .execute(
                "INSERT INTO agent_status
                     (agent_id, name, current_task_id, current_task_title, status,
                      started_at, last_heartbeat, resource_usage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(agent_id) DO UPDATE SET
                     name = excluded.name,
                     current_task_id = excluded.current_task_id,
                     current_task_title = excluded.current_task_title,
                     status = excluded.status,
                     last_heartbeat = excluded.last_heartbeat,
                     resource_usage = excluded.resource_usage",
                params![
                    row.agent_id.as_str(),
                    row.name.as_str(),
                    row.current_task_id.as_deref(),
                    row.current_task_title.as_deref(),
                    row.status.as_str(),
                    row.started_at.to_rfc3339(),
                    row.last_heartbeat.to_rfc3339(),
                    row.resource_usage.to_string(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn active_agents(&self, window_secs: i64) -> Result<Vec<AgentStatusRow>, SinkError> {
        let cutoff = (Utc::now() - Duration::seconds(window_secs)).to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                "SELECT agent_id, name, current_task_id, current_task_title, status,
                        started_at, last_heartbeat, resource_usage
                 FROM agent_status
                 WHERE last_heartbeat > ?1
                 ORDER BY agent_id",
                params![cutoff],
            )
            .await
            .map_err(query_err)?;

        let mut agents = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            agents.push(row_to_agent(&row).map_err(query_err)?);
        }
        Ok(agents)
    }

    async fn upsert_problem(&self, problem: &Problem) -> Result<(), SinkError> {
        // discovered_at and tasks_created survive re-upserts; everything
        // else reflects the latest scan.
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO problems ({PROBLEM_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                     ON CONFLICT(id) DO UPDATE SET
                         title = excluded.title,
                         description = excluded.description,
                         severity = excluded.severity,
                         frequency = excluded.frequency,
                         impact = excluded.impact,
                         last_occurrence = excluded.last_occurrence,
                         source_file = excluded.source_file,
                         affected_components = excluded.affected_components,
                         symptoms = excluded.symptoms,
                         evidence = excluded.evidence,
                         related_issues = excluded.related_issues"
                ),
                params![
                    problem.id.as_str(),
                    problem.title.as_str(),
                    problem.description.as_str(),
                    problem.severity.as_str(),
                    frequency_str(problem.frequency),
                    impact_str(problem.impact),
                    problem_status_str(problem.status),
                    problem.discovered_at.to_rfc3339(),
                    problem.discovered_by.as_str(),
                    problem.last_occurrence.map(|t| t.to_rfc3339()),
                    problem.resolved_at.map(|t| t.to_rfc3339()),
                    problem.resolved_by.as_deref(),
                    problem.resolution.as_deref(),
                    problem.source_file.as_str(),
                    serde_json::to_string(&problem.affected_components).unwrap_or_default(),
                    serde_json::to_string(&problem.symptoms).unwrap_or_default(),
                    serde_json::to_string(&problem.evidence).unwrap_or_default(),
                    serde_json::to_string(&problem.related_issues).unwrap_or_default(),
                    serde_json::to_string(&problem.tasks_created).unwrap_or_default(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_problem(&self, id: &str) -> Result<Option<Problem>, SinkError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_problem(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn list_problems(&self, filter: &str) -> Result<Vec<Problem>, SinkError> {
        let (clause, arg): (&str, Option<&str>) = match filter {
            "active" => ("WHERE status = ?1", Some("active")),
            "resolved" => ("WHERE status = ?1", Some("resolved")),
            "critical" => ("WHERE severity = ?1", Some("critical")),
            _ => ("", None),
        };
        let sql = format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems {clause} ORDER BY discovered_at DESC"
        );
        let mut rows = match arg {
            Some(arg) => self.conn().query(&sql, params![arg]).await,
            None => self.conn().query(&sql, ()).await,
        }
        .map_err(query_err)?;

        let mut problems = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            problems.push(row_to_problem(&row).map_err(query_err)?);
        }
        Ok(problems)
    }

    async fn link_task(&self, problem_id: &str, task_id: &str) -> Result<(), SinkError> {
        let mut problem = self
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| SinkError::NotFound {
                entity: "problem".to_string(),
                id: problem_id.to_string(),
            })?;
        if !problem.tasks_created.iter().any(|t| t == task_id) {
            problem.tasks_created.push(task_id.to_string());
        }
        self.conn()
            .execute(
                "UPDATE problems SET tasks_created = ?1 WHERE id = ?2",
                params![
                    serde_json::to_string(&problem.tasks_created).unwrap_or_default(),
                    problem_id,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn resolve_problem(
        &self,
        id: &str,
        resolution: &str,
        resolved_by: &str,
    ) -> Result<Problem, SinkError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE problems
                 SET status = 'resolved', resolution = ?1, resolved_by = ?2, resolved_at = ?3
                 WHERE id = ?4",
                params![resolution, resolved_by, Utc::now().to_rfc3339(), id],
            )
            .await
            .map_err(query_err)?;
        if affected == 0 {
            return Err(SinkError::NotFound {
                entity: "problem".to_string(),
                id: id.to_string(),
            });
        }
        self.get_problem(id).await?.ok_or_else(|| SinkError::NotFound {
            entity: "problem".to_string(),
            id: id.to_string(),
        })
    }

    async fn set_config(&self, entry: &ConfigEntry) -> Result<(), SinkError> {
        self.conn()
            .execute(
                "INSERT INTO configuration (key, value, setting_type)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     setting_type = excluded.setting_type",
                params![
                    entry.key.as_str(),
                    entry.value.as_str(),
                    entry.setting_type.as_str()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> Result<Option<ConfigEntry>, SinkError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT key, value, setting_type FROM configuration WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(ConfigEntry {
                key: row.get(0).map_err(query_err)?,
                value: row.get(1).map_err(query_err)?,
                setting_type: row.get(2).map_err(query_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn all_config(&self) -> Result<Vec<ConfigEntry>, SinkError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT key, value, setting_type FROM configuration ORDER BY key",
                (),
            )
            .await
            .map_err(query_err)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            entries.push(ConfigEntry {
                key: row.get(0).map_err(query_err)?,
                value: row.get(1).map_err(query_err)?,
                setting_type: row.get(2).map_err(query_err)?,
            });
        }
        Ok(entries)
    }

    async fn upsert_weight(&self, weight_type: &str, value: f64) -> Result<(), SinkError> {
        self.conn()
            .execute(
                "INSERT INTO priority_weights (weight_type, weight_value)
                 VALUES (?1, ?2)
                 ON CONFLICT(weight_type) DO UPDATE SET weight_value = excluded.weight_value",
                params![weight_type, value],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn metrics(&self) -> Result<SwarmMetrics, SinkError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status, COUNT(*) FROM task_executions GROUP BY status ORDER BY status",
                (),
            )
            .await
            .map_err(query_err)?;
        let mut task_counts = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            task_counts.push(StatusCount {
                status: row.get(0).map_err(query_err)?,
                count: row.get(1).map_err(query_err)?,
            });
        }

        let mut rows = self
            .conn()
            .query(
                "SELECT AVG(duration_seconds) FROM task_executions WHERE duration_seconds IS NOT NULL",
                (),
            )
            .await
            .map_err(query_err)?;
        let avg_duration_seconds = rows
            .next()
            .await
            .map_err(query_err)?
            .and_then(|row| row.get::<f64>(0).ok());

        let success_rate = self.success_rate(30).await?;

        Ok(SwarmMetrics {
            task_counts,
            avg_duration_seconds,
            success_rate,
        })
    }

    async fn success_rate(&self, days: i64) -> Result<Option<f64>, SinkError> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                "SELECT
                     SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                     SUM(CASE WHEN status IN ('completed', 'failed') THEN 1 ELSE 0 END)
                 FROM task_executions
                 WHERE created_at > ?1",
                params![cutoff],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };
        let completed: i64 = row.get(0).unwrap_or(0);
        let terminal: i64 = row.get(1).unwrap_or(0);
        if terminal == 0 {
            return Ok(None);
        }
        Ok(Some(completed as f64 / terminal as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::{Frequency, Problem, ProblemImpact, Severity};

    #[tokio::test]
    async fn execution_rows_upsert_and_aggregate() {
        let sink = LibSqlSink::new_memory().await.unwrap();

        let mut row = TaskExecutionRow {
            task_id: "t1".into(),
            title: "Fix".into(),
            task_type: "bug".into(),
            status: "active".into(),
            created_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
        };
        sink.record_execution(&row).await.unwrap();

        row.status = "completed".into();
        row.completed_at = Some(Utc::now());
        row.duration_seconds = Some(12.0);
        sink.record_execution(&row).await.unwrap();

        let metrics = sink.metrics().await.unwrap();
        assert_eq!(metrics.task_counts.len(), 1);
        assert_eq!(metrics.task_counts[0].status, "completed");
        assert_eq!(metrics.task_counts[0].count, 1);
        assert_eq!(metrics.avg_duration_seconds, Some(12.0));
        assert_eq!(metrics.success_rate, Some(1.0));
    }

    #[tokio::test]
    async fn agent_heartbeat_window() {
        let sink = LibSqlSink::new_memory().await.unwrap();

        let fresh = AgentStatusRow {
            agent_id: "agent-1".into(),
            name: "agent-1".into(),
            current_task_id: None,
            current_task_title: None,
            status: "idle".into(),
            started_at: Utc::now(),
            last_heartbeat: Utc::now(),
            resource_usage: serde_json::json!({}),
        };
        let stale = AgentStatusRow {
            agent_id: "agent-2".into(),
            last_heartbeat: Utc::now() - Duration::minutes(10),
            ..fresh.clone()
        };
        sink.upsert_agent(&fresh).await.unwrap();
        sink.upsert_agent(&stale).await.unwrap();

        let active = sink.active_agents(300).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].agent_id, "agent-1");
    }

    #[tokio::test]
    async fn problem_upsert_preserves_discovery_and_links() {
        let sink = LibSqlSink::new_memory().await.unwrap();

        let mut problem = Problem::discovered(
            "DB connection leak",
            Severity::High,
            Frequency::Frequent,
            ProblemImpact::DegradedPerformance,
            "/src/db.rs",
        );
        sink.upsert_problem(&problem).await.unwrap();
        sink.link_task(&problem.id, "task-9").await.unwrap();

        let first = sink.get_problem(&problem.id).await.unwrap().unwrap();

        // Second scan of the same tree: same ID, fresh timestamps.
        problem.discovered_at = Utc::now();
        problem.severity = Severity::Critical;
        sink.upsert_problem(&problem).await.unwrap();

        let second = sink.get_problem(&problem.id).await.unwrap().unwrap();
        assert_eq!(second.discovered_at, first.discovered_at);
        assert_eq!(second.tasks_created, vec!["task-9".to_string()]);
        assert_eq!(second.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn problem_filters() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        let critical = Problem::discovered(
            "down",
            Severity::Critical,
            Frequency::Constant,
            ProblemImpact::SystemDown,
            "/a",
        );
        let minor = Problem::discovered(
            "typo",
            Severity::Low,
            Frequency::Rare,
            ProblemImpact::Cosmetic,
            "/b",
        );
        sink.upsert_problem(&critical).await.unwrap();
        sink.upsert_problem(&minor).await.unwrap();

        assert_eq!(sink.list_problems("all").await.unwrap().len(), 2);
        assert_eq!(sink.list_problems("critical").await.unwrap().len(), 1);
        assert_eq!(sink.list_problems("resolved").await.unwrap().len(), 0);

        let resolved = sink
            .resolve_problem(&minor.id, "fixed the typo", "operator")
            .await
            .unwrap();
        assert_eq!(resolved.resolution.as_deref(), Some("fixed the typo"));
        assert_eq!(sink.list_problems("resolved").await.unwrap().len(), 1);
        assert_eq!(sink.list_problems("active").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn configuration_roundtrip() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        sink.set_config(&ConfigEntry {
            key: "yolo_mode".into(),
            value: "true".into(),
            setting_type: "bool".into(),
        })
        .await
        .unwrap();

        let entry = sink.get_config("yolo_mode").await.unwrap().unwrap();
        assert_eq!(entry.value, "true");
        assert!(sink.get_config("missing").await.unwrap().is_none());
        assert_eq!(sink.all_config().await.unwrap().len(), 1);
    }
}
