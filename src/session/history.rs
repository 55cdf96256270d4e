use std::sync::Arc;
use tokio::sync::Mutex;

use super::Message;

/// Conversation history shared between a client and its in-flight streams.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl ChatHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub async fn push(&self, message: Message) {
        self.messages.lock().await.push(message);
    }

    /// Appends a user message and its reply under a single lock.
    pub async fn push_turn(&self, user: Message, assistant: Message) {
        let mut messages = self.messages.lock().await;
        messages.push(user);
        messages.push(assistant);
    }

    /// Returns a copy of all messages in order.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    /// Returns the number of messages.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Returns true if no messages have been recorded.
    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Clears all messages.
    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }
}
