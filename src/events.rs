//! Append-only event log — one JSON object per line.
//!
//! Writes are best-effort: a log that cannot be opened or written must
//! never fail the task that tried to record the event. Ordering within
//! the file follows write order.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Lifecycle moment being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Finish,
    Error,
}

/// Which kind of work the event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Execution,
    Analysis,
}

/// One record in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub kind: EventKind,
    /// Task ID the event belongs to.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    /// A `start` event for a task.
    pub fn start(kind: EventKind, id: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Start,
            kind,
            id: id.into(),
            timestamp: Utc::now(),
            pid: std::process::id(),
            exit_code: None,
            duration_sec: None,
            scenario: None,
            error: None,
        }
    }

    /// A `finish` event carrying the outcome.
    pub fn finish(kind: EventKind, id: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Finish,
            ..Self::start(kind, id)
        }
    }

    /// Builder: exit code.
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Builder: wall-clock duration.
    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_sec = Some(duration.as_secs_f64());
        self
    }

    /// Builder: scenario name.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Builder: error string.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Handle on the append-only log file.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one event. Failures are logged and swallowed.
    pub async fn append(&self, event: Event) {
        if let Err(e) = self.try_append(&event).await {
            warn!(path = %self.path.display(), error = %e, "Failed to append event");
        }
    }

    async fn try_append(&self, event: &Event) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Read every event in write order. Malformed lines are skipped.
    pub async fn read_all(&self) -> Vec<Event> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        raw.lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("logs/events.ndjson"));

        log.append(Event::start(EventKind::Execution, "t1")).await;
        log.append(
            Event::finish(EventKind::Execution, "t1")
                .with_exit_code(0)
                .with_scenario("claude-code"),
        )
        .await;

        let events = log.read_all().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Start);
        assert_eq!(events[1].event_type, EventType::Finish);
        assert_eq!(events[1].exit_code, Some(0));
        assert_eq!(events[1].scenario.as_deref(), Some("claude-code"));
    }

    #[tokio::test]
    async fn read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("absent.ndjson"));
        assert!(log.read_all().await.is_empty());
    }

    #[test]
    fn event_json_uses_wire_names() {
        let event = Event::start(EventKind::Analysis, "t9");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"start\""));
        assert!(json.contains("\"kind\":\"analysis\""));
        assert!(!json.contains("exit_code"));
    }
}
