mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use event_reset::{config, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "event-reset", version, about = "Cascading reset service for event data")]
struct Cli {
    /// Config file (default: ~/.event-reset/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP reset service
    Serve,
    /// Reset an event directly against the local database
    Reset {
        event_id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Abort the cascade after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Show how many records a reset would delete
    Preview { event_id: String },
    /// Create or upgrade the database schema
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::EventResetConfig::load_from(path)?,
        None => config::EventResetConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Reset {
            event_id,
            yes,
            timeout_ms,
        } => cli::reset::reset(&config, &event_id, yes, timeout_ms).await?,
        Command::Preview { event_id } => cli::preview::preview(&config, &event_id).await?,
        Command::Migrate => cli::migrate(&config)?,
    }

    Ok(())
}
