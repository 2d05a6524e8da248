use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

const SECRETS_DIR: &str = "/run/secrets";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Secret {0} not found in /run/secrets or the environment")]
    MissingSecret(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub meili_url: String,
    pub meili_key: String,
    pub webhook_secret: Option<String>,
    /// Deployment origin for absolute redirect URLs, wins over the request's Host header.
    pub origin_override: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url: try_load("REDIS_URL", "redis://localhost:6379")?,
            meili_url: try_load("MEILI_URL", "http://localhost:7700")?,
            meili_key: read_secret("MEILI_ADMIN_KEY")
                .ok_or_else(|| ConfigError::MissingSecret("MEILI_ADMIN_KEY".to_string()))?,
            webhook_secret: read_secret("WEBHOOK_SECRET"),
            origin_override: var("DIRECT_URL").ok().filter(|url| !url.trim().is_empty()),
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

/// Docker secret file first, then an environment variable of the same name for local runs.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("{SECRETS_DIR}/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .or_else(|_| env::var(secret_name).map(|s| s.trim().to_string()))
        .ok()
        .filter(|s| !s.is_empty())
}
