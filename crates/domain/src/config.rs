//! Environment-driven configuration for processes hosting the sentinel
//! container.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

const DEFAULT_OFFSET_PATH: &str = "sentinel.log";
const DEFAULT_PROPERTIES_PATH: &str = "sentinels.properties";
const DEFAULT_POLL_MILLIS: u64 = 1000;

/// Key configuration derived from `.env`/process variables so every host
/// shares a deterministic environment contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    offset_path: PathBuf,
    properties_path: PathBuf,
    poll_interval: Duration,
    database_url: Option<String>,
}

impl BootstrapConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// optional `SENTINEL_*` variables. Malformed entries surface as
    /// `ConfigError` so the host fails before serving any notification.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let offset_path = get_optional_var("SENTINEL_OFFSET_PATH")
            .unwrap_or_else(|| DEFAULT_OFFSET_PATH.to_string());
        let properties_path = get_optional_var("SENTINEL_PROPERTIES_PATH")
            .unwrap_or_else(|| DEFAULT_PROPERTIES_PATH.to_string());
        let poll_millis = match get_optional_var("SENTINEL_POLL_MILLIS") {
            Some(raw) => parse_poll_millis(&raw)?,
            None => DEFAULT_POLL_MILLIS,
        };

        Ok(Self {
            offset_path: PathBuf::from(offset_path),
            properties_path: PathBuf::from(properties_path),
            poll_interval: Duration::from_millis(poll_millis),
            database_url: get_optional_var("SENTINEL_DATABASE_URL"),
        })
    }

    pub fn offset_path(&self) -> &Path {
        &self.offset_path
    }

    pub fn properties_path(&self) -> &Path {
        &self.properties_path
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// When set, offsets are kept in the database instead of the local file.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }
}

fn parse_poll_millis(raw: &str) -> Result<u64, ConfigError> {
    let key = "SENTINEL_POLL_MILLIS";
    let millis: u64 = raw
        .parse()
        .map_err(|source| ConfigError::InvalidNumber { key, source })?;
    if millis == 0 {
        return Err(ConfigError::ZeroInterval { key });
    }
    Ok(millis)
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("LEDGER_SENTINEL_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    ZeroInterval { key: &'static str },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
