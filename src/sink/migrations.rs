//! Version-tracked migrations for the metrics sink.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::SinkError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS task_executions (
            task_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            task_type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            duration_seconds REAL
        );
        CREATE INDEX IF NOT EXISTS idx_task_executions_status ON task_executions(status);
        CREATE INDEX IF NOT EXISTS idx_task_executions_created ON task_executions(created_at);

        CREATE TABLE IF NOT EXISTS agent_status (
            agent_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            current_task_id TEXT,
            current_task_title TEXT,
            status TEXT NOT NULL DEFAULT 'idle',
            started_at TEXT NOT NULL,
            last_heartbeat TEXT NOT NULL,
            resource_usage TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_agent_status_heartbeat ON agent_status(last_heartbeat);

        CREATE TABLE IF NOT EXISTS problems (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            severity TEXT NOT NULL,
            frequency TEXT NOT NULL,
            impact TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            discovered_at TEXT NOT NULL,
            discovered_by TEXT NOT NULL,
            last_occurrence TEXT,
            resolved_at TEXT,
            resolved_by TEXT,
            resolution TEXT,
            source_file TEXT NOT NULL,
            affected_components TEXT NOT NULL DEFAULT '[]',
            symptoms TEXT NOT NULL DEFAULT '[]',
            evidence TEXT NOT NULL DEFAULT '{}',
            related_issues TEXT NOT NULL DEFAULT '[]',
            tasks_created TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_problems_status ON problems(status);
        CREATE INDEX IF NOT EXISTS idx_problems_severity ON problems(severity);

        CREATE TABLE IF NOT EXISTS configuration (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            setting_type TEXT NOT NULL DEFAULT 'string'
        );

        CREATE TABLE IF NOT EXISTS priority_weights (
            weight_type TEXT PRIMARY KEY,
            weight_value REAL NOT NULL
        );
    "#,
}];

/// Run all pending migrations against a connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), SinkError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| SinkError::Migration(e.to_string()))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| SinkError::Migration(format!("{}: {e}", migration.name)))?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| SinkError::Migration(e.to_string()))?;
        tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, SinkError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| SinkError::Migration(e.to_string()))?;
    let row = rows
        .next()
        .await
        .map_err(|e| SinkError::Migration(e.to_string()))?;
    Ok(row.and_then(|r| r.get::<i64>(0).ok()).unwrap_or(0))
}
