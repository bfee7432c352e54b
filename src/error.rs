//! WolfElect Error Types

use thiserror::Error;

/// Result type alias for WolfElect operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfElect error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to render configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Backend errors
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("No open transaction")]
    NoTransaction,

    // Driver errors
    #[error("Election driver is already running")]
    AlreadyRunning,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is transient, i.e. the next attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Backend(_) | Error::Database(_) | Error::Conflict(_) | Error::Io(_)
        )
    }
}
