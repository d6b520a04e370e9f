//! Inputs and outcomes of a cascade reset.
//!
//! [`EventId`] is the validated identifier, [`ResetSummary`] the success payload,
//! and [`ResetError`] the engine's failure taxonomy with [`PartialFailure`]
//! describing an aborted cascade.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::gateway::GatewayError;

/// Longest identifier accepted by [`EventId::parse`].
pub const MAX_EVENT_ID_LEN: usize = 128;

/// A syntactically valid event identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Trim and validate a caller-supplied identifier. Accepts 1–128 ASCII
    /// alphanumerics, `-` and `_` (UUIDs, slugs, `E1`).
    pub fn parse(raw: &str) -> Result<Self, ResetError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ResetError::Validation("event_id must not be empty".into()));
        }
        if id.len() > MAX_EVENT_ID_LEN {
            return Err(ResetError::Validation(format!(
                "event_id must be at most {MAX_EVENT_ID_LEN} characters"
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ResetError::Validation(
                "event_id may only contain letters, digits, '-' and '_'".into(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Records removed per collection by a completed reset (or counted by a preview).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub event_id: String,
    pub deleted: BTreeMap<String, u64>,
}

impl ResetSummary {
    pub fn total(&self) -> u64 {
        self.deleted.values().sum()
    }
}

/// A cascade that stopped partway. Nothing already deleted is restored and the
/// event fields were not reset; retrying is safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub event_id: String,
    /// Records removed before the failure, including earlier steps of the failed branch.
    pub deleted: BTreeMap<String, u64>,
    pub completed_branches: Vec<String>,
    pub failed_branch: String,
    pub failed_collection: String,
    pub cause: String,
    pub timed_out: bool,
}

impl PartialFailure {
    pub fn total_deleted(&self) -> u64 {
        self.deleted.values().sum()
    }
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reset of event {} failed at {} (branch {}): {}",
            self.event_id, self.failed_collection, self.failed_branch, self.cause
        )
    }
}

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("{0}")]
    Validation(String),

    #[error("event not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    PartialFailure(PartialFailure),

    /// Store failure before any deletion was attempted.
    #[error("store error: {0}")]
    Store(#[from] GatewayError),
}
