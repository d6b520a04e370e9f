//! [`PersistenceGateway`] over a shared rusqlite connection.
//!
//! Each call runs one logical statement on tokio's blocking pool and holds the
//! connection mutex only for the duration of that statement.

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::sync::{Arc, Mutex};

use super::gateway::{is_identifier, FieldUpdate, FieldValue, Filter, GatewayError, PersistenceGateway, ID_FIELD};

/// Upper bound on bound parameters per `IN (...)` statement.
const IN_CHUNK: usize = 500;

#[derive(Clone)]
pub struct SqliteGateway {
    db: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self::new(Arc::new(Mutex::new(conn)))
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }

    async fn run<T, F>(&self, f: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, GatewayError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| GatewayError::Task(format!("db lock poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| GatewayError::Task(e.to_string()))?
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Text(s) => ToSqlOutput::from(s.as_str()),
            FieldValue::Integer(i) => ToSqlOutput::from(*i),
            FieldValue::Real(r) => ToSqlOutput::from(*r),
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Now => ToSqlOutput::Owned(Value::Text(chrono::Utc::now().to_rfc3339())),
        })
    }
}

fn check_ident(name: &str) -> Result<(), GatewayError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(GatewayError::InvalidIdentifier(name.to_string()))
    }
}

/// Split a filter into one `(where_clause, params)` pair per statement.
fn where_clauses(collection: &str, filter: &Filter) -> Result<Vec<(String, Vec<String>)>, GatewayError> {
    check_ident(collection)?;
    check_ident(filter.field())?;

    match filter {
        Filter::Eq { field, value } => Ok(vec![(format!("{field} = ?1"), vec![value.clone()])]),
        Filter::In { field, values } => {
            if values.is_empty() {
                return Err(GatewayError::EmptyFilter {
                    collection: collection.to_string(),
                    field: field.clone(),
                });
            }
            Ok(values
                .chunks(IN_CHUNK)
                .map(|chunk| {
                    let placeholders = (1..=chunk.len())
                        .map(|i| format!("?{i}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    (format!("{field} IN ({placeholders})"), chunk.to_vec())
                })
                .collect())
        }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn select_ids(&self, collection: &str, filter: &Filter) -> Result<Vec<String>, GatewayError> {
        let clauses = where_clauses(collection, filter)?;
        let collection = collection.to_string();

        self.run(move |conn| {
            let mut ids = Vec::new();
            for (clause, params) in clauses {
                let sql = format!("SELECT {ID_FIELD} FROM {collection} WHERE {clause} ORDER BY {ID_FIELD}");
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
            Ok(ids)
        })
        .await
    }

    async fn delete_where(&self, collection: &str, filter: &Filter) -> Result<u64, GatewayError> {
        let clauses = where_clauses(collection, filter)?;
        let collection = collection.to_string();

        self.run(move |conn| {
            // Chunks of one IN filter commit together
            let tx = conn.unchecked_transaction()?;
            let mut removed = 0u64;
            for (clause, params) in clauses {
                let sql = format!("DELETE FROM {collection} WHERE {clause}");
                removed += tx.execute(&sql, params_from_iter(params.iter()))? as u64;
            }
            tx.commit()?;
            tracing::debug!(collection = %collection, removed, "delete executed");
            Ok(removed)
        })
        .await
    }

    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[FieldUpdate],
    ) -> Result<u64, GatewayError> {
        if fields.is_empty() {
            return Err(GatewayError::NoFields(collection.to_string()));
        }
        for update in fields {
            check_ident(&update.field)?;
        }
        let clauses = where_clauses(collection, filter)?;
        let collection = collection.to_string();
        let fields = fields.to_vec();

        self.run(move |conn| {
            let assignments = fields
                .iter()
                .enumerate()
                .map(|(i, u)| format!("{} = ?{}", u.field, i + 1))
                .collect::<Vec<_>>()
                .join(", ");

            let tx = conn.unchecked_transaction()?;
            let mut updated = 0u64;
            for (clause, params) in clauses {
                // Filter placeholders follow the SET placeholders
                let clause = renumber_placeholders(&clause, fields.len());
                let sql = format!("UPDATE {collection} SET {assignments} WHERE {clause}");
                let mut bound: Vec<&dyn ToSql> = fields.iter().map(|u| &u.value as &dyn ToSql).collect();
                bound.extend(params.iter().map(|p| p as &dyn ToSql));
                updated += tx.execute(&sql, bound.as_slice())? as u64;
            }
            tx.commit()?;
            Ok(updated)
        })
        .await
    }
}

/// Shift `?N` placeholders in a generated where clause by `offset`.
fn renumber_placeholders(clause: &str, offset: usize) -> String {
    let mut out = String::with_capacity(clause.len() + 8);
    let mut chars = clause.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '?' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        match digits.parse::<usize>() {
            Ok(n) => out.push_str(&format!("?{}", n + offset)),
            Err(_) => out.push('?'),
        }
    }
    out
}
