use thiserror::Error;

/// Main error type for the fax adapter
#[derive(Error, Debug)]
pub enum FaxError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The image file could not be turned into a vCon
    #[error("Build error: {0}")]
    Build(String),

    /// State file persistence errors
    #[error("State error: {0}")]
    State(String),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(String),
}

/// Convenient Result type using FaxError
pub type Result<T> = std::result::Result<T, FaxError>;
