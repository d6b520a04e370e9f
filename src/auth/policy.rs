//! Authorization policies. Every policy fails closed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::Identity;
use crate::config::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Purge an event's dependents and restore its fields.
    ResetEvent,
    /// Count what a reset would remove.
    PreviewEvent,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResetEvent => "reset-event",
            Self::PreviewEvent => "preview-event",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait AuthorizationPolicy: Send + Sync {
    fn authorize(&self, identity: &Identity, action: Action) -> bool;
}

/// Grants every action to callers holding any of the configured roles.
pub struct RolePolicy {
    roles: HashSet<String>,
}

impl RolePolicy {
    pub fn new(roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }
}

impl AuthorizationPolicy for RolePolicy {
    fn authorize(&self, identity: &Identity, action: Action) -> bool {
        let Some(roles) = identity.roles.as_deref() else {
            tracing::debug!(subject = %identity.subject, %action, "no role data, denying");
            return false;
        };
        roles.iter().any(|r| self.roles.contains(r))
    }
}

/// Denies everything.
pub struct DenyAll;

impl AuthorizationPolicy for DenyAll {
    fn authorize(&self, _identity: &Identity, _action: Action) -> bool {
        false
    }
}

/// Create the authorization policy from config.
pub fn create_policy(config: &AuthConfig) -> Arc<dyn AuthorizationPolicy> {
    if config.reset_roles.is_empty() {
        tracing::warn!("auth.reset_roles is empty; every reset will be denied");
        return Arc::new(DenyAll);
    }
    Arc::new(RolePolicy::new(config.reset_roles.iter().cloned()))
}
