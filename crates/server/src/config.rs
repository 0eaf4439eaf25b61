use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Absolute base URL, used as the `iss` claim and for discovery endpoint URLs.
    pub issuer_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Where unauthenticated users are sent from `/authorize`.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_key_reload_interval")]
    pub key_reload_interval_secs: u64,
    #[serde(default = "default_code_cleanup_interval")]
    pub code_cleanup_interval_secs: u64,
    /// Deadline for a whole token exchange, in milliseconds.
    #[serde(default = "default_db_timeout")]
    pub db_timeout_ms: u64,
    #[serde(default = "default_scopes_supported")]
    pub scopes_supported: Vec<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_login_url() -> String {
    "/login".to_string()
}

fn default_session_cookie() -> String {
    "sentinel_session".to_string()
}

fn default_key_reload_interval() -> u64 {
    300
}

fn default_code_cleanup_interval() -> u64 {
    600
}

fn default_db_timeout() -> u64 {
    5000
}

fn default_scopes_supported() -> Vec<String> {
    ["read:profile", "read:data", "write:data", "admin:users"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issuer = url::Url::parse(&self.issuer_url)
            .map_err(|e| ConfigError::Validation(format!("issuer_url is not a valid URL: {e}")))?;
        if issuer.cannot_be_a_base() {
            return Err(ConfigError::Validation(
                "issuer_url must be an absolute http(s) URL".into(),
            ));
        }
        if self.session_cookie.is_empty() {
            return Err(ConfigError::Validation(
                "session_cookie must not be empty".into(),
            ));
        }
        if self.key_reload_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "key_reload_interval_secs must be > 0".into(),
            ));
        }
        if self.code_cleanup_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "code_cleanup_interval_secs must be > 0".into(),
            ));
        }
        if self.db_timeout_ms == 0 {
            return Err(ConfigError::Validation("db_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn key_reload_interval(&self) -> Duration {
        Duration::from_secs(self.key_reload_interval_secs)
    }

    pub fn code_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.code_cleanup_interval_secs)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching a key (nested keys separated by double
/// underscores, no prefix) overrides the file value, e.g. `DB_TIMEOUT_MS=2000`.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;

    Ok(app)
}
