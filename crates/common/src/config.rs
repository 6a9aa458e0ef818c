//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Bearer-token verification configuration.
    pub auth: AuthConfig,
    /// Group membership provider configuration.
    pub groups: GroupsConfig,
    /// Notification dispatcher configuration.
    pub notifications: NotificationsConfig,
    /// Multi-tenancy configuration.
    pub tenancy: TenancyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Per-operation budget for poll queries and mutations, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

/// Bearer-token verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider.
    pub secret: String,
    /// Internal API key guarding the internal endpoints.
    #[serde(default)]
    pub internal_api_key: String,
}

/// Group membership provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupsConfig {
    /// Base URL of the group service.
    pub base_url: String,
    /// Internal API key for group notification dispatch.
    #[serde(default)]
    pub internal_api_key: String,
}

/// Notification dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Base URL of the notifications service.
    pub base_url: String,
    /// Internal API key for the notifications service.
    #[serde(default)]
    pub internal_api_key: String,
}

/// Multi-tenancy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Organization id assigned to legacy records that lack one.
    pub default_org_id: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_query_timeout_ms() -> u64 {
    500
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `LIVEPOLL_ENV`)
    /// 3. Environment variables with `LIVEPOLL_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("LIVEPOLL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LIVEPOLL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("LIVEPOLL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
