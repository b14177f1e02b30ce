//! Error types for fxchat-core

use crate::transport::Stage;
use thiserror::Error;

/// Result type alias for fxchat-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for collaborator operations
#[derive(Error, Debug)]
pub enum Error {
    /// A transport primitive failed during the given lifecycle stage
    #[error("{stage} failed: {message}")]
    Transport { stage: Stage, message: String },

    /// The exchange-rate source could not produce rates
    #[error("Rate source error: {0}")]
    RateSource(String),

    /// Generic error message
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Create a transport error for `stage`
    pub fn transport(stage: Stage, message: impl Into<String>) -> Self {
        Self::Transport {
            stage,
            message: message.into(),
        }
    }

    /// The lifecycle stage a transport error belongs to
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Transport { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = Error::transport(Stage::Authenticate, "not-authorized");
        assert_eq!(err.to_string(), "authenticate failed: not-authorized");
        assert_eq!(err.stage(), Some(Stage::Authenticate));
    }

    #[test]
    fn test_rate_source_error_has_no_stage() {
        let err = Error::RateSource("timeout".to_string());
        assert_eq!(err.to_string(), "Rate source error: timeout");
        assert_eq!(err.stage(), None);
    }
}
