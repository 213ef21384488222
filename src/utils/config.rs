//! TOML configuration for histmap-server
//!
//! Infrastructure settings live in `histmap.toml`. Secrets never do: the file
//! names the environment variables that hold them (the JWT secret, Turso
//! credentials), and `.env` is loaded by the binary before the config is read.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest signing secret accepted at startup, in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Longest token lifetime accepted, one year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 8_760;

/// Root configuration structure loaded from histmap.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistmapConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `"pretty"` (default) or `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============= Authentication Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable name containing the JWT secret
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,

    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

fn default_jwt_secret_env() -> String {
    "JWT_SECRET".to_string()
}

fn default_token_ttl_hours() -> i64 {
    crate::auth::jwt::DEFAULT_TOKEN_TTL_HOURS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

// ============= Database Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Environment variable for Turso URL (optional cloud config)
    pub turso_url_env: Option<String>,

    /// Environment variable for Turso auth token
    pub turso_token_env: Option<String>,
}

fn default_database_url() -> String {
    "./data/histmap.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            turso_url_env: None,
            turso_token_env: None,
        }
    }
}

// ============= Session Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Trailing window within which a session counts as active
    #[serde(default = "default_active_window_secs")]
    pub active_window_secs: u64,

    /// Peak concurrency tracker interval
    #[serde(default = "default_peak_interval_secs")]
    pub peak_interval_secs: u64,

    /// Metrics sampler interval
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Whether the metrics sampler deletes expired and ended sessions
    #[serde(default = "default_true")]
    pub purge_expired: bool,

    /// Anonymous sessions idle for longer than this are deleted by the
    /// metrics sampler. Unset keeps the full history.
    #[serde(default)]
    pub anonymous_retention_days: Option<u32>,
}

fn default_active_window_secs() -> u64 {
    300
}

fn default_peak_interval_secs() -> u64 {
    60
}

fn default_metrics_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            active_window_secs: default_active_window_secs(),
            peak_interval_secs: default_peak_interval_secs(),
            metrics_interval_secs: default_metrics_interval_secs(),
            purge_expired: true,
            anonymous_retention_days: None,
        }
    }
}

impl SessionsConfig {
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_secs)
    }

    pub fn peak_interval(&self) -> Duration {
        Duration::from_secs(self.peak_interval_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Secret in '{0}' must be at least {MIN_JWT_SECRET_BYTES} bytes")]
    WeakSecret(String),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl HistmapConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: HistmapConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that have no sensible fallback. Environment variables
    /// are checked separately by [`HistmapConfig::jwt_secret`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret_env.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret_env must name an environment variable".to_string(),
            ));
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.auth.token_ttl_hours) {
            return Err(ConfigError::ValidationError(format!(
                "auth.token_ttl_hours must be between 1 and {}",
                MAX_TOKEN_TTL_HOURS
            )));
        }

        let sessions = &self.sessions;
        for (name, value) in [
            ("sessions.active_window_secs", sessions.active_window_secs),
            ("sessions.peak_interval_secs", sessions.peak_interval_secs),
            ("sessions.metrics_interval_secs", sessions.metrics_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if sessions.anonymous_retention_days == Some(0) {
            return Err(ConfigError::ValidationError(
                "sessions.anonymous_retention_days must be at least 1 when set".to_string(),
            ));
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "server.log_format must be \"pretty\" or \"json\", got \"{}\"",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the JWT secret from the environment
    pub fn jwt_secret(&self) -> Result<String, ConfigError> {
        self.jwt_secret_from(|name| std::env::var(name).ok())
    }

    /// Resolve the JWT secret through `lookup` and enforce its minimum length.
    pub fn jwt_secret_from<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = &self.auth.jwt_secret_env;
        let secret = lookup(name).ok_or_else(|| ConfigError::MissingEnvVar(name.clone()))?;

        if secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::WeakSecret(name.clone()));
        }

        Ok(secret)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auth.token_ttl_hours)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`; `verbose` forces `debug`.
pub fn init_tracing(server: &ServerConfig, verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let fallback = if verbose {
        "debug".to_string()
    } else {
        format!("histmap={},tower_http={}", server.log_level, server.log_level)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if server.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}
