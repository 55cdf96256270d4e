//! Error types for the simple-agent library.

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::ClientError;

/// Message used when the backend reports an error without one.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred";

/// Unified error type for the agent facade.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration or client setup failed
    #[error("Initialization failed: {0}")]
    Initialization(#[from] ConfigError),

    /// The response stream reported an error
    #[error("{0}")]
    Stream(String),

    /// The request was cancelled before it finished
    #[error("Request cancelled")]
    Cancelled,

    /// Any other client failure
    #[error(transparent)]
    Client(ClientError),

    /// The message to send was empty
    #[error("Message must not be empty")]
    EmptyMessage,
}

impl From<ClientError> for AgentError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Aborted => AgentError::Cancelled,
            other => AgentError::Client(other),
        }
    }
}
