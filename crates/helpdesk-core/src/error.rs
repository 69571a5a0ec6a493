use thiserror::Error;

/// Top-level error type shared by the store, memory, and config layers.
///
/// Higher layers (the dialogue orchestrator) wrap these in their own error
/// type and decide per call site whether a failure is fatal to the turn.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HelpdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),
}

impl From<toml::de::Error> for HelpdeskError {
    fn from(err: toml::de::Error) -> Self {
        HelpdeskError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HelpdeskError {
    fn from(err: toml::ser::Error) -> Self {
        HelpdeskError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HelpdeskError {
    fn from(err: serde_json::Error) -> Self {
        HelpdeskError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for store and memory operations.
pub type Result<T> = std::result::Result<T, HelpdeskError>;
