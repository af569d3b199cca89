//! Error types for the client agent.

use thiserror::Error;

/// Client-side errors.
///
/// None of these is a statement about the license. A failed poll leaves
/// the agent's state as it was and is retried on the next tick.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The authority answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The persisted device identifier could not be read or written.
    #[error("device identity error: {0}")]
    Identity(String),

    /// The agent's background tasks have stopped.
    #[error("agent is shut down")]
    Closed,
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Identity(e.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
