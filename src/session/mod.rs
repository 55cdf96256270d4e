pub mod history;
pub mod message;

pub use history::ChatHistory;
pub use message::{Message, MessageRole};
