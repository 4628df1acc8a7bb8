mod types;

pub use types::*;

use crate::{Error, Result};
use std::env;
use tracing::debug;

pub async fn load() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

    debug!("Loading configuration from: {}", config_path);

    let config_str = tokio::fs::read_to_string(&config_path).await?;
    let mut config: Config = serde_yaml::from_str(&config_str)?;

    if config.mode == InferenceMode::Remote {
        config.remote.token = Some(resolve_token(&config.remote).await?);
    }

    validate(&config)?;

    Ok(config)
}

/// Reads the bearer token from the configured secret source.
pub async fn resolve_token(remote: &RemoteConfig) -> Result<Secret> {
    let raw = match &remote.token_file {
        Some(path) => {
            debug!("Reading API token from file: {}", path);
            tokio::fs::read_to_string(path).await.map_err(|e| {
                Error::config(format!("Failed to read token file '{}': {}", path, e))
            })?
        }
        None => env::var(&remote.token_env).map_err(|_| {
            Error::config(format!(
                "Remote mode requires an API token in the '{}' environment variable",
                remote.token_env
            ))
        })?,
    };

    let token = raw.trim();
    if token.is_empty() {
        return Err(Error::config("API token is empty"));
    }

    Ok(Secret::new(token))
}

pub fn validate(config: &Config) -> Result<()> {
    match config.mode {
        InferenceMode::Remote => {
            if config.remote.endpoint.is_empty() {
                return Err(Error::config("remote.endpoint must not be empty"));
            }
            if config.remote.timeout_secs == 0 {
                return Err(Error::config("remote.timeout_secs must be positive"));
            }
        }
        InferenceMode::Local => {
            if config.local.model.is_empty() {
                return Err(Error::config("local.model must not be empty"));
            }
            if config.local.max_new_tokens == 0 {
                return Err(Error::config("local.max_new_tokens must be positive"));
            }
            if config.local.max_concurrent == 0 {
                return Err(Error::config("local.max_concurrent must be at least 1"));
            }
        }
    }
    Ok(())
}
