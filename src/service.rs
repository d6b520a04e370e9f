//! The reset pipeline: authenticate → authorize → validate → per-event guard → engine.
//!
//! [`ResetService`] is transport-agnostic; the HTTP layer in [`crate::server`]
//! only extracts headers and the body and hands them over.

use axum::http::HeaderMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::auth::{Action, AuthError, AuthenticationGate, AuthorizationPolicy, Identity};
use crate::cascade::{CascadeEngine, EventId, PartialFailure, ResetError, ResetSummary};
use crate::config::ResetConfig;

/// Body of a reset request.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResetRequest {
    #[serde(default, alias = "eventId")]
    pub event_id: String,
    /// Caller deadline in milliseconds, clamped to `reset.max_timeout_ms`.
    #[serde(default, alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    /// Count instead of deleting.
    #[serde(default, alias = "dryRun")]
    pub dry_run: bool,
}

impl ResetRequest {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset(ResetSummary),
    Preview(ResetSummary),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(AuthError),

    #[error("not permitted to {action}")]
    Forbidden { subject: String, action: Action },

    #[error("event not found: {0}")]
    NotFound(String),

    #[error("a reset for event {0} is already in progress")]
    InProgress(String),

    #[error("{0}")]
    PartialFailure(PartialFailure),

    #[error("{0}")]
    Unexpected(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ProviderUnavailable(cause) => {
                Self::Unexpected(format!("identity provider unavailable: {cause}"))
            }
            other => Self::Unauthorized(other),
        }
    }
}

impl From<ResetError> for ServiceError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::Validation(msg) => Self::Validation(msg),
            ResetError::NotFound(id) => Self::NotFound(id),
            ResetError::PartialFailure(p) => Self::PartialFailure(p),
            ResetError::Store(e) => Self::Unexpected(e.to_string()),
        }
    }
}

/// Event ids with a reset currently running.
#[derive(Clone, Default)]
pub struct EventLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl EventLocks {
    /// Claim `event_id`, or `None` if another reset holds it.
    pub fn try_acquire(&self, event_id: &EventId) -> Option<EventGuard> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if !active.insert(event_id.to_string()) {
            return None;
        }
        Some(EventGuard {
            active: Arc::clone(&self.active),
            event_id: event_id.to_string(),
        })
    }

    pub fn is_held(&self, event_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(event_id)
    }
}

/// Releases the event when dropped.
pub struct EventGuard {
    active: Arc<Mutex<HashSet<String>>>,
    event_id: String,
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.event_id);
    }
}

#[derive(Clone)]
pub struct ResetService {
    gate: AuthenticationGate,
    policy: Arc<dyn AuthorizationPolicy>,
    engine: CascadeEngine,
    locks: EventLocks,
    limits: ResetConfig,
}

impl ResetService {
    pub fn new(
        gate: AuthenticationGate,
        policy: Arc<dyn AuthorizationPolicy>,
        engine: CascadeEngine,
        limits: ResetConfig,
    ) -> Self {
        Self {
            gate,
            policy,
            engine,
            locks: EventLocks::default(),
            limits,
        }
    }

    pub fn locks(&self) -> &EventLocks {
        &self.locks
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, ServiceError> {
        self.gate.authenticate(headers).await.map_err(|e| {
            tracing::info!(reason = %e, "authentication failed");
            ServiceError::from(e)
        })
    }

    pub fn authorize(&self, identity: &Identity, action: Action) -> Result<(), ServiceError> {
        if self.policy.authorize(identity, action) {
            return Ok(());
        }
        tracing::warn!(subject = %identity.subject, %action, "authorization denied");
        Err(ServiceError::Forbidden {
            subject: identity.subject.clone(),
            action,
        })
    }

    /// Authorize `identity` for the request and run it.
    pub async fn execute(
        &self,
        identity: &Identity,
        request: ResetRequest,
    ) -> Result<ResetOutcome, ServiceError> {
        let action = if request.dry_run {
            Action::PreviewEvent
        } else {
            Action::ResetEvent
        };
        self.authorize(identity, action)?;

        let event_id = EventId::parse(&request.event_id)?;
        tracing::info!(subject = %identity.subject, event_id = %event_id, %action, "request authorized");

        if request.dry_run {
            let preview = self.engine.preview(event_id.as_str()).await?;
            return Ok(ResetOutcome::Preview(preview));
        }

        let Some(_guard) = self.locks.try_acquire(&event_id) else {
            tracing::warn!(event_id = %event_id, "reset already running, rejecting");
            return Err(ServiceError::InProgress(event_id.to_string()));
        };

        let timeout = Duration::from_millis(self.limits.effective_timeout_ms(request.timeout_ms));
        let summary = self
            .engine
            .reset(event_id.as_str(), Some(Instant::now() + timeout))
            .await?;
        Ok(ResetOutcome::Reset(summary))
    }
}
