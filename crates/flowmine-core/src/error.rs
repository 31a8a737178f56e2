//! Unified error types for flowmine

use thiserror::Error;

/// Unified error type for all flowmine operations
#[derive(Error, Debug)]
pub enum FlowError {
    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Execution errors
    #[error("Step '{command}' failed: {message}")]
    StepExecution { command: String, message: String },

    #[error("Workflow chain not found: {0}")]
    ChainNotFound(String),

    #[error("Invalid workflow transition: {0}")]
    InvalidTransition(String),

    #[error("No checkpoint available for: {0}")]
    NoCheckpoint(String),

    // Mining / synthesis errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl FlowError {
    /// Build a step failure for `command`
    pub fn step(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;
