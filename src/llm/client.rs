use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// The reason the model finished generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop point reached
    Stop,
    /// Stopped to request tool calls
    ToolCalls,
    /// Maximum tokens reached
    MaxTokens,
    /// Any other reason reported by the backend
    Other,
}

impl FinishReason {
    /// Maps a wire `finish_reason` value.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "tool_calls" => FinishReason::ToolCalls,
            "length" => FinishReason::MaxTokens,
            _ => FinishReason::Other,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// A tool invocation requested by the model.
///
/// The facade only observes these; running the tool belongs to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier of the call, as assigned by the backend
    pub call_id: String,
    /// The name of the requested tool
    pub name: String,
    /// Arguments for the tool
    pub args: serde_json::Value,
}

/// Events produced by the client during a single message exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of response text
    Content(String),
    /// The response is complete
    Finished(FinishReason),
    /// The backend reported an error
    Error {
        message: Option<String>,
    },
    /// The model asked for a tool to be run
    ToolCallRequest(ToolCallRequest),
    /// Token accounting for the exchange
    Usage(Usage),
}

/// A stream of client events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ClientError>> + Send>>;

/// Errors raised by an agent client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An API error occurred
    #[error("API error: {0}")]
    Api(String),
    /// A network error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The response from the backend was invalid
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    /// The client was used before `initialize` completed
    #[error("Client is not initialized")]
    NotInitialized,
    /// The request was aborted through its cancellation token
    #[error("Request aborted")]
    Aborted,
}

/// A stateful connection to a conversational agent backend.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Returns true once `initialize` has completed successfully.
    fn is_initialized(&self) -> bool;

    /// Prepares the client for use (credentials, transport).
    async fn initialize(&self) -> Result<(), ClientError>;

    /// Sends a user message and returns the stream of response events.
    ///
    /// Implementations must stop producing events once `cancel` fires.
    async fn send_message_stream(
        &self,
        message: &str,
        cancel: CancellationToken,
        prompt_id: &str,
    ) -> Result<EventStream, ClientError>;
}
