//! # Streaming Agent Example
//!
//! Holds a short two-turn conversation, printing the reply as it streams in.
//!
//! ## Usage
//!
//! ```bash
//! export GEMINI_API_KEY="your-api-key"
//! cargo run --example streaming_agent
//! ```

use simple_agent::prelude::*;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut params = ConfigParameters::for_workspace(std::env::current_dir()?);
    params.model = "gemini-2.5-flash".to_string();
    let agent = SimpleAgent::with_config(Config::new(params)).await?;

    println!("Session: {}", agent.session_id());

    let mut print_chunk = |chunk: &str| {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    };

    for prompt in [
        "In one sentence, what is a facade in software design?",
        "Now give a one-line example in Rust.",
    ] {
        println!("\nUser: {}\nAssistant: ", prompt);
        match agent.send_message(prompt, Some(&mut print_chunk)).await {
            Ok(_) => println!(),
            Err(AgentError::Cancelled) => println!("\n(cancelled)"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
