use std::{env, fmt::Display, net::IpAddr, str::FromStr};

use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub media_root: String,
    pub media_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub max_upload_bytes: u64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require(&lookup, "DATABASE_URL")?,
            bind_addr: try_load(&lookup, "BIND_ADDR", "0.0.0.0")?,
            port: try_load(&lookup, "RUST_PORT", "8000")?,
            media_root: try_load(&lookup, "MEDIA_ROOT", "./media")?,
            media_url: try_load(&lookup, "MEDIA_URL", "/media/")?,
            db_max_connections: try_load(&lookup, "DB_MAX_CONNECTIONS", "5")?,
            run_migrations: try_load(&lookup, "RUN_MIGRATIONS", "true")?,
            max_upload_bytes: try_load(&lookup, "MAX_UPLOAD_BYTES", "10485760")?,
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            warn!("Environment variable {key} not found");
            Err(ConfigError::Missing(key))
        }
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}
