//! SQL DDL for the event tables and their dependents.
//!
//! Defines `events`, the three Level-1 collections (`invoices`, `allocations`,
//! `cars`), their Level-2 children and `schema_meta`. Foreign keys
//! omit `ON DELETE CASCADE`: deleting a parent while children still reference it
//! is rejected by SQLite, so the cascade order is enforced by the store as well.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft' CHECK(status IN ('draft','active','closed')),
    total_collected_cents INTEGER NOT NULL DEFAULT 0,
    total_disbursed_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Level 1: invoices issued for the event
CREATE TABLE IF NOT EXISTS invoices (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id),
    number TEXT NOT NULL,
    amount_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Level 2: invoice line items
CREATE TABLE IF NOT EXISTS invoice_items (
    id TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL REFERENCES invoices(id),
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL DEFAULT 0
);

-- Level 1: payout allocation headers
CREATE TABLE IF NOT EXISTS allocations (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id),
    label TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Level 2: allocation lines
CREATE TABLE IF NOT EXISTS allocation_lines (
    id TEXT PRIMARY KEY,
    allocation_id TEXT NOT NULL REFERENCES allocations(id),
    recipient TEXT NOT NULL,
    amount_cents INTEGER NOT NULL DEFAULT 0
);

-- Level 1: participant-carrying units
CREATE TABLE IF NOT EXISTS cars (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL REFERENCES events(id),
    label TEXT NOT NULL
);

-- Level 2: participants riding in a car
CREATE TABLE IF NOT EXISTS car_participants (
    id TEXT PRIMARY KEY,
    car_id TEXT NOT NULL REFERENCES cars(id),
    name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_status ON events(status);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
