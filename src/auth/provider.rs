//! Identity providers that turn a bearer token into an [`Identity`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{AuthError, Identity};
use crate::config::{AuthConfig, AuthProviderKind};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve `token`. `Ok(None)` means the provider rejected it.
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, AuthError>;
}

/// Tokens configured up front, for operators and tests.
pub struct StaticTokenProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenProvider {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            tokens: entries.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::from_entries(config.tokens.iter().map(|t| {
            (
                t.token.clone(),
                Identity {
                    subject: t.subject.clone(),
                    roles: t.roles.clone(),
                },
            )
        }))
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.tokens.get(token).cloned())
    }
}

/// Resolves tokens against a GoTrue-compatible `GET {base_url}/user` endpoint.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: Option<AppMetadata>,
}

#[derive(Debug, Deserialize, Default)]
struct AppMetadata {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
}

impl UserResponse {
    fn into_identity(self) -> Identity {
        // The top-level `role` is the session's database role, not a privilege;
        // only app_metadata carries roles.
        let roles = self.app_metadata.and_then(|meta| {
            let mut roles = meta.roles.unwrap_or_default();
            roles.extend(meta.role);
            (!roles.is_empty()).then_some(roles)
        });
        Identity {
            subject: self.email.unwrap_or(self.id),
            roles,
        }
    }
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build identity provider HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let mut request = self
            .client
            .get(format!("{}/user", self.base_url))
            .bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e.without_url(), "identity provider request failed");
            AuthError::ProviderUnavailable("request failed".into())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::warn!(%status, "identity provider returned an error");
            return Err(AuthError::ProviderUnavailable(format!("provider returned {status}")));
        }

        let user: UserResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e.without_url(), "identity provider sent an unreadable body");
            AuthError::ProviderUnavailable("unreadable provider response".into())
        })?;
        Ok(Some(user.into_identity()))
    }
}

/// Create an identity provider from config.
pub fn create_provider(config: &AuthConfig) -> Result<Arc<dyn IdentityProvider>> {
    match config.provider {
        AuthProviderKind::Static => {
            if config.tokens.is_empty() {
                tracing::warn!("static auth provider has no tokens; every request will be rejected");
            }
            Ok(Arc::new(StaticTokenProvider::from_config(config)))
        }
        AuthProviderKind::Http => {
            let url = config
                .url
                .as_deref()
                .context("auth.provider = \"http\" requires auth.url")?;
            let provider = HttpIdentityProvider::new(
                url,
                config.api_key.clone(),
                Duration::from_millis(config.request_timeout_ms),
            )?;
            Ok(Arc::new(provider))
        }
    }
}
