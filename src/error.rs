//! Error types for the resident service.

/// Top-level error type for the resident service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A trigger arrived with a cause outside the supported set.
    #[error("unrecognized trigger: {0}")]
    UnrecognizedTrigger(String),

    /// The platform refused to grant privileged foreground execution.
    #[error("foreground acquisition failed: {0}")]
    ForegroundAcquisition(String),

    /// The enabled flag could not be durably committed.
    #[error("flag persistence failed: {0}")]
    FlagPersistence(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Host envelope failed validation.
    #[error("contract error: {0}")]
    Contract(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServiceError>;
