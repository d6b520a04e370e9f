//! The persistence boundary the cascade runs against.
//!
//! [`PersistenceGateway`] has three operations: select ids, delete by filter,
//! update fields by filter. Every call is an await point and implementations must
//! not require the caller to hold anything across calls.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Name of the primary-key column every collection exposes.
pub const ID_FIELD: &str = "id";

/// Row selector for a single collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// `field = value`
    Eq { field: String, value: String },
    /// `field IN (values...)`. Must not be empty.
    In { field: String, values: Vec<String> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::In { field, .. } => field,
        }
    }
}

/// Value written by [`PersistenceGateway::update_fields`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
    /// Current UTC time, resolved by the gateway at write time.
    Now,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub field: String,
    pub value: FieldValue,
}

impl FieldUpdate {
    pub fn new(field: impl Into<String>, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("empty IN filter on {collection}.{field}")]
    EmptyFilter { collection: String, field: String },

    #[error("update on {0} has no fields")]
    NoFields(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store task failed: {0}")]
    Task(String),

    /// Failure raised by a non-SQLite gateway.
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Return the primary keys of every record in `collection` matching `filter`.
    async fn select_ids(&self, collection: &str, filter: &Filter) -> Result<Vec<String>, GatewayError>;

    /// Delete every record in `collection` matching `filter`; returns the number removed.
    async fn delete_where(&self, collection: &str, filter: &Filter) -> Result<u64, GatewayError>;

    /// Set `fields` on every record matching `filter`; returns the number updated.
    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[FieldUpdate],
    ) -> Result<u64, GatewayError>;
}

/// True if `name` can be interpolated into SQL as a bare identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
