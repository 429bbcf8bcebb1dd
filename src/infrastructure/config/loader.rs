use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Config file read from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tally.yaml";

/// Prefix of environment overrides; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "TALLY_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("app_name cannot be empty")]
    EmptyAppName,

    #[error("Store directory cannot be empty")]
    EmptyStoreDir,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_conflict_retries: {0}. Cannot be 0")]
    InvalidMaxConflictRetries(u32),

    #[error("Consumer {0} cannot be empty")]
    EmptyConsumerSetting(&'static str),

    #[error("Invalid {0}: must be at least 1 second")]
    InvalidTimeout(&'static str),

    #[error("HTTP host cannot be empty")]
    EmptyHttpHost,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `path`, or `tally.yaml` in the working directory if present
    /// 3. Environment variables (`TALLY_*`, highest priority)
    pub fn load(path: Option<&Path>) -> Result<Config> {
        if let Some(path) = path {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
        }

        let config: Config = Self::figment(path)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// The merged provider chain, before extraction.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.map_or_else(|| Path::new(DEFAULT_CONFIG_FILE).to_path_buf(), Path::to_path_buf);
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.app_name.trim().is_empty() {
            return Err(ConfigError::EmptyAppName);
        }

        if config.store.dir.trim().is_empty() {
            return Err(ConfigError::EmptyStoreDir);
        }
        if config.store.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.store.max_connections));
        }
        if config.store.busy_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("store.busy_timeout_secs"));
        }
        if config.store.open_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("store.open_timeout_secs"));
        }

        if config.accumulator.max_conflict_retries == 0 {
            return Err(ConfigError::InvalidMaxConflictRetries(
                config.accumulator.max_conflict_retries,
            ));
        }

        let consumer = &config.consumer;
        for (name, value) in [
            ("brokers", &consumer.brokers),
            ("topic", &consumer.topic),
            ("group", &consumer.group),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyConsumerSetting(name));
            }
        }
        if consumer.join_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("consumer.join_timeout_secs"));
        }

        if config.http.host.trim().is_empty() {
            return Err(ConfigError::EmptyHttpHost);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}
