pub mod client;
pub mod gemini;

pub use client::{
    AgentClient, ClientError, EventStream, FinishReason, StreamEvent, ToolCallRequest, Usage,
};
pub use gemini::{GeminiChatClient, SseDecoder};
