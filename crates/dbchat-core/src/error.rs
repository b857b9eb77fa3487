//! Error types for dbchat core

use thiserror::Error;

/// Result type alias using the dbchat Error
pub type Result<T> = std::result::Result<T, Error>;

/// dbchat error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend launch error: {0}")]
    Launch(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}
