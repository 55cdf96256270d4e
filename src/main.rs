use anyhow::Context;
use clap::Parser;
use simple_agent::{CancellationToken, Config, ConfigParameters, SimpleAgent};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Send a message to the agent and stream the reply to stdout.
#[derive(Debug, Parser)]
#[command(name = "simple-agent", version)]
struct Cli {
    /// The message to send
    message: String,

    /// Workspace root the agent operates on
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Chat model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Override the API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut params = ConfigParameters::for_workspace(&cli.workspace);
    params.debug_mode = cli.debug;
    params.timeout_secs = cli.timeout;
    if let Some(model) = cli.model {
        params.model = model;
    }
    if let Some(base_url) = cli.base_url {
        params.base_url = base_url;
    }

    let agent = SimpleAgent::with_config(Config::new(params))
        .await
        .context("failed to start agent")?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let mut print_chunk = |chunk: &str| {
        let _ = write!(stdout, "{}", chunk);
        let _ = stdout.flush();
    };

    agent
        .send_message_with_cancel(&cli.message, Some(&mut print_chunk), &cancel)
        .await?;
    println!();

    Ok(())
}
