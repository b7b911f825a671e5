//! Error types for the task swarm.

use std::time::Duration;

/// Top-level error type for the swarm.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Metrics sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration file {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task store errors.
///
/// `ClaimLost` is the expected outcome of a lost claim race; callers
/// recover silently by re-polling. The rest surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Malformed task document {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Storage operation failed on {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Claim lost: {0} was taken by another agent")]
    ClaimLost(String),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// External executor errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("{command} exited with code {exit_code}")]
    NonZeroExit { command: String, exit_code: i32 },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Problem scanner errors.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Scan root does not exist: {0}")]
    RootMissing(String),

    #[error("IO error during scan: {0}")]
    Io(#[from] std::io::Error),
}

/// Metrics sink errors. Never propagated into task execution.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Row not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl ExecError {
    /// Exit code to report in events, where one exists.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::NonZeroExit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Result type alias for the swarm.
pub type Result<T> = std::result::Result<T, Error>;
