pub mod simple_agent;

pub use simple_agent::SimpleAgent;
