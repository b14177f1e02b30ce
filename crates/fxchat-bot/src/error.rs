//! Error types for the conversion bot

use thiserror::Error;

/// Bot specific errors
#[derive(Debug, Error)]
pub enum BotError {
    /// The conversion queue is at capacity
    #[error("Conversion queue is full ({capacity} jobs pending)")]
    QueueFull { capacity: usize },

    /// The conversion worker no longer accepts jobs
    #[error("Conversion worker is shut down")]
    WorkerStopped,

    /// The snapshot for `base` carries no rate for `target`
    #[error("No rate from {base} to {target}")]
    MissingRate { base: String, target: String },

    /// The rate source failed to deliver a snapshot
    #[error("Rate fetch failed for {base}: {reason}")]
    RateFetch { base: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Collaborator error
    #[error(transparent)]
    Core(#[from] fxchat_core::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, BotError>;

/// Convert BotError to fxchat_core::Error
impl From<BotError> for fxchat_core::Error {
    fn from(err: BotError) -> Self {
        match err {
            BotError::Core(inner) => inner,
            BotError::RateFetch { reason, .. } => fxchat_core::Error::RateSource(reason),
            BotError::NetworkError(e) => fxchat_core::Error::RateSource(e.to_string()),
            other => fxchat_core::Error::Generic(other.to_string()),
        }
    }
}
