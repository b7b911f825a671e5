//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Swarm configuration, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// HTTP listening port.
    pub port: u16,
    /// Base directory holding `tasks/`, `logs/`, `config/`, `prompts/`.
    pub base_dir: PathBuf,
    /// Path to the metrics sink database.
    pub db_path: PathBuf,
    /// Number of worker agents.
    pub agent_count: usize,
    /// Staged-folder polling interval (safety net behind the notify wakeup).
    pub poll_interval: Duration,
    /// Per-execution subprocess timeout.
    pub execution_timeout: Duration,
    /// Whether the problem scanner may synthesize tasks autonomously.
    pub yolo_mode: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            port: 8095,
            base_dir: PathBuf::from("./data"),
            db_path: PathBuf::from("./data/swarm-metrics.db"),
            agent_count: 3,
            poll_interval: Duration::from_secs(10),
            execution_timeout: Duration::from_secs(30 * 60),
            yolo_mode: false,
        }
    }
}

impl SwarmConfig {
    /// Build a config from the environment.
    ///
    /// Absent variables fall back to defaults; present-but-invalid values
    /// abort startup with a `ConfigError`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(port) = std::env::var("SERVICE_PORT") {
            cfg.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SERVICE_PORT".to_string(),
                message: format!("not a valid port: {port}"),
            })?;
        }

        if let Ok(base) = std::env::var("SWARM_BASE_DIR") {
            cfg.base_dir = PathBuf::from(base);
            cfg.db_path = cfg.base_dir.join("swarm-metrics.db");
        }

        if let Ok(db) = std::env::var("DB_PATH") {
            cfg.db_path = PathBuf::from(db);
        }

        if let Ok(n) = std::env::var("AGENT_COUNT") {
            cfg.agent_count = n.parse().map_err(|_| ConfigError::InvalidValue {
                key: "AGENT_COUNT".to_string(),
                message: format!("not a valid count: {n}"),
            })?;
        }

        if let Ok(secs) = std::env::var("POLL_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "POLL_INTERVAL_SECS".to_string(),
                message: format!("not a number of seconds: {secs}"),
            })?;
            cfg.poll_interval = Duration::from_secs(secs);
        }

        if let Ok(secs) = std::env::var("EXECUTION_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EXECUTION_TIMEOUT_SECS".to_string(),
                message: format!("not a number of seconds: {secs}"),
            })?;
            cfg.execution_timeout = Duration::from_secs(secs);
        }

        if let Ok(yolo) = std::env::var("YOLO_MODE") {
            cfg.yolo_mode = matches!(yolo.as_str(), "1" | "true" | "yes");
        }

        Ok(cfg)
    }

    /// Root of the task folders.
    pub fn tasks_dir(&self) -> PathBuf {
        self.base_dir.join("tasks")
    }

    /// Path of the append-only event log.
    pub fn events_path(&self) -> PathBuf {
        self.base_dir.join("logs").join("events.ndjson")
    }

    /// Path of the scenario registry file.
    pub fn scenario_registry_path(&self) -> PathBuf {
        self.base_dir.join("config").join("scenario-registry.yaml")
    }

    /// Path of the priority weights file.
    pub fn priority_weights_path(&self) -> PathBuf {
        self.base_dir.join("config").join("priority-weights.yaml")
    }

    /// Directory holding prompt templates.
    pub fn prompts_dir(&self) -> PathBuf {
        self.base_dir.join("prompts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let cfg = SwarmConfig::default();
        assert_eq!(cfg.port, 8095);
        assert_eq!(cfg.agent_count, 3);
        assert_eq!(cfg.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn derived_paths_hang_off_base_dir() {
        let cfg = SwarmConfig {
            base_dir: PathBuf::from("/srv/swarm"),
            ..SwarmConfig::default()
        };
        assert_eq!(cfg.tasks_dir(), PathBuf::from("/srv/swarm/tasks"));
        assert_eq!(
            cfg.events_path(),
            PathBuf::from("/srv/swarm/logs/events.ndjson")
        );
        assert_eq!(
            cfg.scenario_registry_path(),
            PathBuf::from("/srv/swarm/config/scenario-registry.yaml")
        );
    }
}
