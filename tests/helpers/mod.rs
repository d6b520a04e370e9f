#![allow(dead_code)]

use async_trait::async_trait;
use event_reset::auth::{AuthenticationGate, Identity, RolePolicy, StaticTokenProvider};
use event_reset::cascade::{
    CascadeEngine, CascadeGraph, FieldUpdate, Filter, GatewayError, PersistenceGateway, SqliteGateway,
};
use event_reset::config::ResetConfig;
use event_reset::db;
use event_reset::service::ResetService;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const VIEWER_TOKEN: &str = "viewer-token";
pub const ROLELESS_TOKEN: &str = "roleless-token";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn insert_event(conn: &Connection, id: &str, status: &str) {
    conn.execute(
        "INSERT INTO events (id, name, status, total_collected_cents, total_disbursed_cents, created_at, updated_at)
         VALUES (?1, ?2, ?3, 125000, 98000, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        params![id, format!("Event {id}"), status],
    )
    .unwrap();
}

/// Insert an invoice for `event_id` with `items` line items.
pub fn insert_invoice(conn: &Connection, event_id: &str, id: &str, items: usize) {
    conn.execute(
        "INSERT INTO invoices (id, event_id, number, amount_cents, created_at) VALUES (?1, ?2, ?1, 5000, 't')",
        params![id, event_id],
    )
    .unwrap();
    for n in 0..items {
        conn.execute(
            "INSERT INTO invoice_items (id, invoice_id, description, amount_cents) VALUES (?1, ?2, 'entry fee', 2500)",
            params![format!("{id}-item-{n}"), id],
        )
        .unwrap();
    }
}

pub fn insert_allocation(conn: &Connection, event_id: &str, id: &str, lines: usize) {
    conn.execute(
        "INSERT INTO allocations (id, event_id, label, created_at) VALUES (?1, ?2, 'prize pool', 't')",
        params![id, event_id],
    )
    .unwrap();
    for n in 0..lines {
        conn.execute(
            "INSERT INTO allocation_lines (id, allocation_id, recipient, amount_cents) VALUES (?1, ?2, 'winner', 1000)",
            params![format!("{id}-line-{n}"), id],
        )
        .unwrap();
    }
}

pub fn insert_car(conn: &Connection, event_id: &str, id: &str, participants: usize) {
    conn.execute(
        "INSERT INTO cars (id, event_id, label) VALUES (?1, ?2, ?1)",
        params![id, event_id],
    )
    .unwrap();
    for n in 0..participants {
        conn.execute(
            "INSERT INTO car_participants (id, car_id, name) VALUES (?1, ?2, 'driver')",
            params![format!("{id}-p-{n}"), id],
        )
        .unwrap();
    }
}

/// `event_id` with 3 invoices (7 items), 2 allocations (5 lines) and 1 car (4 participants).
pub fn seed_full_event(conn: &Connection, event_id: &str) {
    insert_event(conn, event_id, "active");
    insert_invoice(conn, event_id, &format!("{event_id}-inv-1"), 3);
    insert_invoice(conn, event_id, &format!("{event_id}-inv-2"), 2);
    insert_invoice(conn, event_id, &format!("{event_id}-inv-3"), 2);
    insert_allocation(conn, event_id, &format!("{event_id}-alloc-1"), 3);
    insert_allocation(conn, event_id, &format!("{event_id}-alloc-2"), 2);
    insert_car(conn, event_id, &format!("{event_id}-car-1"), 4);
}

/// Records still attached to `event_id`, per collection.
pub fn remaining(conn: &Connection, event_id: &str) -> BTreeMap<&'static str, i64> {
    let queries: [(&str, &str); 6] = [
        ("invoices", "SELECT COUNT(*) FROM invoices WHERE event_id = ?1"),
        (
            "invoice_items",
            "SELECT COUNT(*) FROM invoice_items WHERE invoice_id IN (SELECT id FROM invoices WHERE event_id = ?1)",
        ),
        ("allocations", "SELECT COUNT(*) FROM allocations WHERE event_id = ?1"),
        (
            "allocation_lines",
            "SELECT COUNT(*) FROM allocation_lines WHERE allocation_id IN (SELECT id FROM allocations WHERE event_id = ?1)",
        ),
        ("cars", "SELECT COUNT(*) FROM cars WHERE event_id = ?1"),
        (
            "car_participants",
            "SELECT COUNT(*) FROM car_participants WHERE car_id IN (SELECT id FROM cars WHERE event_id = ?1)",
        ),
    ];
    queries
        .iter()
        .map(|(name, sql)| {
            let n: i64 = conn.query_row(sql, params![event_id], |row| row.get(0)).unwrap();
            (*name, n)
        })
        .collect()
}

/// Total rows in a table regardless of event.
pub fn table_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

/// `(status, total_collected_cents, total_disbursed_cents)` of an event.
pub fn event_state(conn: &Connection, event_id: &str) -> (String, i64, i64) {
    conn.query_row(
        "SELECT status, total_collected_cents, total_disbursed_cents FROM events WHERE id = ?1",
        params![event_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Select(String),
    Delete(String),
    Update(String),
}

/// Wraps a [`SqliteGateway`], recording every call in order. Can inject a failure
/// or a delay on one specific call.
pub struct RecordingGateway {
    inner: SqliteGateway,
    calls: Mutex<Vec<Call>>,
    fail_on: Mutex<Option<Call>>,
    delay_on: Mutex<Option<(Call, Duration)>>,
}

impl RecordingGateway {
    pub fn new(inner: SqliteGateway) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            delay_on: Mutex::new(None),
        }
    }

    pub fn fail_on(&self, call: Option<Call>) {
        *self.fail_on.lock().unwrap() = call;
    }

    pub fn delay_on(&self, call: Call, delay: Duration) {
        *self.delay_on.lock().unwrap() = Some((call, delay));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.inner.connection()
    }

    async fn before(&self, call: Call) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(call.clone());

        let delay = match &*self.delay_on.lock().unwrap() {
            Some((c, d)) if *c == call => Some(*d),
            _ => None,
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        if self.fail_on.lock().unwrap().as_ref() == Some(&call) {
            return Err(GatewayError::Other(format!("injected failure on {call:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn select_ids(&self, collection: &str, filter: &Filter) -> Result<Vec<String>, GatewayError> {
        self.before(Call::Select(collection.to_string())).await?;
        self.inner.select_ids(collection, filter).await
    }

    async fn delete_where(&self, collection: &str, filter: &Filter) -> Result<u64, GatewayError> {
        self.before(Call::Delete(collection.to_string())).await?;
        self.inner.delete_where(collection, filter).await
    }

    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[FieldUpdate],
    ) -> Result<u64, GatewayError> {
        self.before(Call::Update(collection.to_string())).await?;
        self.inner.update_fields(collection, filter, fields).await
    }
}

/// A recording gateway over a fresh database populated by `seed`.
pub fn recording_gateway(seed: impl FnOnce(&Connection)) -> Arc<RecordingGateway> {
    let conn = test_db();
    seed(&conn);
    Arc::new(RecordingGateway::new(SqliteGateway::from_connection(conn)))
}

pub fn engine_over(gateway: Arc<RecordingGateway>, graph: CascadeGraph) -> CascadeEngine {
    CascadeEngine::new(gateway, graph)
}

/// A service accepting [`ADMIN_TOKEN`] (role `admin`), [`VIEWER_TOKEN`] (role
/// `viewer`) and [`ROLELESS_TOKEN`] (no role data); only `admin` may reset.
pub fn service_over(gateway: Arc<RecordingGateway>) -> ResetService {
    let provider = StaticTokenProvider::from_entries([
        (
            ADMIN_TOKEN.to_string(),
            Identity {
                subject: "ops@example.com".into(),
                roles: Some(vec!["admin".into()]),
            },
        ),
        (
            VIEWER_TOKEN.to_string(),
            Identity {
                subject: "viewer@example.com".into(),
                roles: Some(vec!["viewer".into()]),
            },
        ),
        (
            ROLELESS_TOKEN.to_string(),
            Identity {
                subject: "anon@example.com".into(),
                roles: None,
            },
        ),
    ]);
    ResetService::new(
        AuthenticationGate::new(Arc::new(provider)),
        Arc::new(RolePolicy::new(["admin".to_string()])),
        CascadeEngine::new(gateway, CascadeGraph::standard()),
        ResetConfig::default(),
    )
}
