//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::AppConfig;

/// Environment variable consulted when `llm.api_key` is not configured.
const API_KEY_FALLBACK_VAR: &str = "GOOGLE_API_KEY";

/// Load configuration from `config.{toml,yaml,json}` and `DOCCHAT__*` env vars.
pub fn load_config() -> ServiceResult<AppConfig> {
    let mut config: AppConfig = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("DOCCHAT")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    if config.llm.api_key.as_deref().is_none_or(str::is_empty) {
        config.llm.api_key = std::env::var(API_KEY_FALLBACK_VAR)
            .ok()
            .filter(|k| !k.is_empty());
    }

    config
        .validate()
        .map_err(|message| ServiceError::Config { message })?;

    Ok(config)
}
