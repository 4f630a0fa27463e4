//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::time::Duration;

use tracing::Level;
use url::Url;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_url: Url,
    pub timeout: Duration,
    /// Accept the consent prompt automatically when the backend asks for authentication.
    pub auto_consent: bool,
    pub admin_password: Option<String>,
    pub log_level: Level,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Backend ---
        let server_url_str =
            lookup("QUIZICIST_SERVER_URL").unwrap_or_else(|| "http://localhost:5000".to_string());
        let server_url = Url::parse(&server_url_str).map_err(|e| {
            ConfigError::InvalidValue("QUIZICIST_SERVER_URL".to_string(), e.to_string())
        })?;
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "QUIZICIST_SERVER_URL".to_string(),
                format!("unsupported scheme '{}'", server_url.scheme()),
            ));
        }

        let timeout_str = lookup("QUIZICIST_TIMEOUT_SECS").unwrap_or_else(|| "20".to_string());
        let timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "QUIZICIST_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        let auto_consent = match lookup("QUIZICIST_AUTO_CONSENT") {
            None => false,
            Some(value) => parse_flag(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "QUIZICIST_AUTO_CONSENT".to_string(),
                    format!("'{}' is not a boolean", value),
                )
            })?,
        };

        let admin_password = lookup("QUIZICIST_ADMIN_PASSWORD").filter(|p| !p.is_empty());

        // --- Logging ---
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "LOG_FORMAT".to_string(),
                    format!("'{}' is neither 'pretty' nor 'json'", other),
                ))
            }
        };

        Ok(Self {
            server_url,
            timeout,
            auto_consent,
            admin_password,
            log_level,
            log_format,
        })
    }

    /// The admin password, or an error naming the variable that should hold it.
    pub fn require_admin_password(&self) -> Result<&str, ConfigError> {
        self.admin_password
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("QUIZICIST_ADMIN_PASSWORD".to_string()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
