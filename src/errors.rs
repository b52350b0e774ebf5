// src/errors.rs

//! Crate-wide error type and exit-code mapping.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetpipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task definition: {0}")]
    DuplicateTask(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Sequence '{sequence}' aborted: task '{task}' failed")]
    SequenceAborted { sequence: String, task: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssetpipeError {
    /// Process exit code for this error class.
    ///
    /// - `1`: a fatal stage failure aborted the sequence
    /// - `2`: configuration or task-graph error
    /// - `3`: I/O error outside of a stage
    /// - `4`: anything else
    pub fn exit_code(&self) -> i32 {
        match self {
            AssetpipeError::SequenceAborted { .. } => 1,
            AssetpipeError::ConfigError(_)
            | AssetpipeError::TaskNotFound(_)
            | AssetpipeError::DuplicateTask(_)
            | AssetpipeError::DagCycle(_)
            | AssetpipeError::TomlError(_) => 2,
            AssetpipeError::IoError(_) => 3,
            AssetpipeError::InvalidVersion(_)
            | AssetpipeError::JsonError(_)
            | AssetpipeError::Other(_) => 4,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetpipeError>;
