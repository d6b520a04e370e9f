use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EventResetConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub reset: ResetConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Which identity provider resolves bearer tokens.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthProviderKind {
    /// Tokens listed in `[[auth.tokens]]`.
    Static,
    /// A remote identity service queried with the caller's token.
    Http,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub provider: AuthProviderKind,
    /// Base URL of the identity service; `GET {url}/user` resolves a token.
    pub url: Option<String>,
    /// Project key sent as the `apikey` header to the identity service.
    pub api_key: Option<String>,
    /// Roles allowed to reset events. Empty means nobody is.
    pub reset_roles: Vec<String>,
    pub tokens: Vec<StaticToken>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticToken {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResetConfig {
    /// Deadline applied when a caller does not supply one.
    pub default_timeout_ms: u64,
    /// Upper bound on caller-supplied deadlines.
    pub max_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_app_dir()
            .join("events.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: AuthProviderKind::Static,
            url: None,
            api_key: None,
            reset_roles: vec!["admin".into()],
            tokens: Vec::new(),
            request_timeout_ms: 5_000,
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_timeout_ms: 120_000,
        }
    }
}

impl ResetConfig {
    /// Resolve the timeout for one request, clamping caller input to the configured maximum.
    pub fn effective_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms)
    }
}

/// Returns `~/.event-reset/`
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".event-reset")
}

/// Returns the default config file path: `~/.event-reset/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl EventResetConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EventResetConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("EVENT_RESET_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("EVENT_RESET_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("EVENT_RESET_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                if let Ok(port) = port.parse() {
                    self.server.host = host.to_string();
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("EVENT_RESET_AUTH_URL") {
            self.auth.url = Some(val);
            self.auth.provider = AuthProviderKind::Http;
        }
        if let Ok(val) = std::env::var("EVENT_RESET_AUTH_API_KEY") {
            self.auth.api_key = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
