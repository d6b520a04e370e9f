//! Caller authentication and authorization.
//!
//! [`AuthenticationGate`] pulls the bearer token out of the request headers and
//! resolves it through an [`IdentityProvider`]; [`AuthorizationPolicy`] then
//! decides whether that identity may perform an [`Action`]. Both run before the
//! store is touched.

pub mod policy;
pub mod provider;

pub use policy::{create_policy, Action, AuthorizationPolicy, DenyAll, RolePolicy};
pub use provider::{create_provider, HttpIdentityProvider, IdentityProvider, StaticTokenProvider};

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    /// `None` when the provider supplied no role data at all.
    pub roles: Option<Vec<String>>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .as_deref()
            .is_some_and(|roles| roles.iter().any(|r| r == role))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("invalid or expired token")]
    Rejected,

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

#[derive(Clone)]
pub struct AuthenticationGate {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthenticationGate {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = extract_bearer(headers)?;
        match self.provider.resolve(token).await? {
            Some(identity) => {
                tracing::debug!(subject = %identity.subject, "caller authenticated");
                Ok(identity)
            }
            None => Err(AuthError::Rejected),
        }
    }
}
