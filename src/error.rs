//! Error types for the sync core

use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync error types
///
/// None of these are fatal. The worst outcome is a stale count on screen
/// that the next fetch or push event corrects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The RPC never produced a response (connection refused, reset, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered `success: false`; the message is shown verbatim
    #[error("{0}")]
    Rejected(String),

    /// No response within the client-side deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A push message that could not be parsed
    #[error("Malformed {event} payload: {reason}")]
    MalformedEvent { event: String, reason: String },

    /// Entity not present in the local store
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Message suitable for the dismissible inline error slot.
    ///
    /// Business failures pass through untouched; transport problems get a
    /// generic sentence.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Rejected(msg) => msg.clone(),
            SyncError::Network(_) | SyncError::Timeout(_) => {
                "Could not reach the server. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the failure came from the transport rather than the server
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}
