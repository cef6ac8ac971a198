//! Error types for genie-stream

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Result type alias using [`GenieError`]
pub type Result<T> = std::result::Result<T, GenieError>;

/// Main error type for genie-stream
///
/// Malformed stream events never show up here: they are dropped and counted
/// inside the consumer so that one bad chunk cannot sink a good answer.
#[derive(Debug, Error)]
pub enum GenieError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// No usable credential; raised before any network call
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Reading the response body failed mid-stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned before streaming began
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Upstream rate limit (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Usage limit reached (HTTP 402)
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// Successful status but no body to stream
    #[error("No response body")]
    MissingBody,

    /// The stream finished without a single content delta
    #[error("The assistant returned no response")]
    EmptyResponse,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation cancelled by user
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Stream deadline elapsed
    #[error("Response timed out after {0:?}")]
    Timeout(Duration),
}

impl GenieError {
    /// Whether this failure happened before or while talking to the server,
    /// as opposed to a local or user-driven outcome.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Http(_)
                | Self::Api { .. }
                | Self::RateLimited(_)
                | Self::PaymentRequired(_)
                | Self::MissingBody
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(GenieError::MissingBody.is_transport());
        assert!(GenieError::RateLimited("slow down".into()).is_transport());
        assert!(GenieError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_transport());
        assert!(!GenieError::Unauthenticated("no session".into()).is_transport());
        assert!(!GenieError::EmptyResponse.is_transport());
        assert!(!GenieError::Cancelled.is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = GenieError::Api {
            status: 503,
            message: "Service temporarily unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "API error (HTTP 503): Service temporarily unavailable"
        );
        assert_eq!(
            GenieError::Timeout(Duration::from_secs(2)).to_string(),
            "Response timed out after 2s"
        );
    }
}
