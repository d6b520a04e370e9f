pub mod preview;
pub mod reset;

use anyhow::Result;
use std::sync::Arc;

use event_reset::cascade::{CascadeEngine, CascadeGraph, SqliteGateway};
use event_reset::config::EventResetConfig;
use event_reset::db;

/// Open the configured database and build an engine over it.
fn open_engine(config: &EventResetConfig) -> Result<CascadeEngine> {
    let conn = db::open_database(config.resolved_db_path())?;
    let gateway = SqliteGateway::from_connection(conn);
    Ok(CascadeEngine::new(Arc::new(gateway), CascadeGraph::standard()))
}

/// Create the database if needed and apply pending migrations.
pub fn migrate(config: &EventResetConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    let version = db::migrations::get_schema_version(&conn)?;
    println!("Database:        {}", db_path.display());
    println!("Schema version:  {version}");
    Ok(())
}
