//! CLI `reset` command: reset one event after operator confirmation.
//!
//! Runs as the local operator with direct database access, so it bypasses the
//! bearer-token gate the HTTP service enforces.

use anyhow::{bail, Result};
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;

use event_reset::cascade::{EventId, ResetError};
use event_reset::config::EventResetConfig;

pub async fn reset(
    config: &EventResetConfig,
    event_id: &str,
    skip_confirm: bool,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let event_id = EventId::parse(event_id)?;
    let engine = super::open_engine(config)?;

    let preview = engine.preview(event_id.as_str()).await?;

    if !skip_confirm {
        println!(
            "WARNING: This will permanently delete {} records generated for event {event_id}",
            preview.total()
        );
        println!("and reset its status and totals.");
        println!("Database: {}", config.resolved_db_path().display());
        print!("\nType the event id to confirm: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != event_id.as_str() {
            bail!("reset cancelled");
        }
    }

    let timeout = Duration::from_millis(config.reset.effective_timeout_ms(timeout_ms));
    match engine.reset(event_id.as_str(), Some(Instant::now() + timeout)).await {
        Ok(summary) => {
            println!("Event {} reset.", summary.event_id);
            for (collection, count) in &summary.deleted {
                println!("  {collection:<20} {count}");
            }
            Ok(())
        }
        Err(ResetError::PartialFailure(p)) => {
            eprintln!("Reset stopped at {} (branch {}): {}", p.failed_collection, p.failed_branch, p.cause);
            eprintln!("Completed branches: {}", p.completed_branches.join(", "));
            for (collection, count) in &p.deleted {
                eprintln!("  {collection:<20} {count}");
            }
            bail!("reset incomplete; it is safe to run it again")
        }
        Err(e) => Err(e.into()),
    }
}
