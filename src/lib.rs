//! # Simple Agent
//!
//! A minimal facade over a conversational agent client: build a
//! configuration, obtain an initialized client, send a message and relay the
//! streamed reply.
//!
//! ## Features
//!
//! - **Facade**: one call to send a message and collect the full response
//! - **Streaming**: optional callback receiving every chunk in arrival order
//! - **Cancellation**: per-call `CancellationToken`s
//! - **Gemini Integration**: built-in client for the Gemini API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use simple_agent::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY from the environment
//!     let agent = SimpleAgent::create(".").await?;
//!
//!     let mut print_chunk = |chunk: &str| print!("{}", chunk);
//!     let reply = agent
//!         .send_message("Explain this repository", Some(&mut print_chunk))
//!         .await?;
//!
//!     println!("\n{} characters", reply.len());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;

// Re-exports for convenient usage
pub use agent::SimpleAgent;
pub use config::{ApprovalMode, Config, ConfigError, ConfigParameters};
pub use error::AgentError;
pub use llm::{
    AgentClient, ClientError, EventStream, FinishReason, GeminiChatClient, StreamEvent,
    ToolCallRequest, Usage,
};
pub use session::{ChatHistory, Message, MessageRole};
pub use tokio_util::sync::CancellationToken;

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::agent::SimpleAgent;
    pub use crate::config::{ApprovalMode, Config, ConfigParameters};
    pub use crate::error::AgentError;
    pub use crate::llm::{AgentClient, StreamEvent};
    pub use tokio_util::sync::CancellationToken;
}
