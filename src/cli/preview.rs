use anyhow::Result;

use event_reset::config::EventResetConfig;

/// Print what a reset of `event_id` would delete.
pub async fn preview(config: &EventResetConfig, event_id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    let summary = engine.preview(event_id).await?;

    println!("Event {}", summary.event_id);
    println!("{}", "=".repeat(40));
    for collection in engine.graph().deletion_order() {
        let count = summary.deleted.get(collection).copied().unwrap_or(0);
        println!("  {collection:<20} {count}");
    }
    println!();
    println!("  {:<20} {}", "total", summary.total());

    Ok(())
}
