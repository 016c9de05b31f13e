//! services/app/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use saarthi_core::CacheConfig;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub log_level: Level,
    pub request_timeout: Duration,
    pub cache_retention: Duration,
    pub chat_poll_interval: Duration,
    pub thought_poll_interval: Duration,
    pub thought_stale_time: Duration,
    pub data_dir: PathBuf,
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

    /// Builds the configuration from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- API endpoint ---
        let api_base_url = lookup("SAARTHI_API_URL")
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "SAARTHI_API_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Cache and polling ---
        let request_timeout = Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 15)?);
        let cache_retention = Duration::from_secs(parse_or(&lookup, "CACHE_RETENTION_SECS", 300)?);
        let chat_poll_interval = Duration::from_millis(parse_or(&lookup, "CHAT_POLL_MS", 2000)?);
        let thought_poll_interval =
            Duration::from_millis(parse_or(&lookup, "THOUGHT_POLL_MS", 60000)?);
        let thought_stale_time = Duration::from_millis(parse_or(&lookup, "THOUGHT_STALE_MS", 30000)?);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // --- Local storage ---
        let data_dir = lookup("SAARTHI_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.saarthi"));

        Ok(Self {
            api_base_url,
            log_level,
            request_timeout,
            cache_retention,
            chat_poll_interval,
            thought_poll_interval,
            thought_stale_time,
            data_dir,
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            request_timeout: self.request_timeout,
            retention: self.cache_retention,
        }
    }

    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join("token.json")
    }

    pub fn card_path(&self) -> PathBuf {
        self.data_dir.join("daily-card.json")
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
