//! Configuration loading and validation.
//!
//! Grounded in `infrastructure/config/loader.rs`'s `Figment`-layered merge
//! (defaults → file → file → env) followed by a separate, non-figment
//! `validate()` pass returning a closed error enum. Swapped from YAML to
//! TOML and from the `ABATHUR_` env prefix to `RAVEN_` per this project's
//! external-interface requirements.

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RavenConfig {
    /// Bounded concurrency for the scatter stage (one worker per epic, up
    /// to this many running at once).
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,

    pub rate_limit_default_wait_secs: u64,
    pub rate_limit_jitter: f64,
    pub rate_limit_max_waits: u32,

    pub loop_max_iterations: u32,
    pub loop_sleep_between_secs: u64,

    pub agent_binary_path: String,

    pub log_level: String,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl Default for RavenConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            rate_limit_default_wait_secs: 60,
            rate_limit_jitter: 0.1,
            rate_limit_max_waits: 5,
            loop_max_iterations: 50,
            loop_sleep_between_secs: 5,
            agent_binary_path: "claude".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_dir: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config by layering, in order: built-in defaults, project
    /// config file, a local override file, then `RAVEN_`-prefixed env vars
    /// (double-underscore separated for nesting).
    pub fn load() -> Result<RavenConfig, ConfigError> {
        let config: RavenConfig = Figment::new()
            .merge(Serialized::defaults(RavenConfig::default()))
            .merge(Toml::file(".raven/config.toml"))
            .merge(Toml::file(".raven/local.toml"))
            .merge(Env::prefixed("RAVEN_").split("__"))
            .extract()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<RavenConfig, ConfigError> {
        let config: RavenConfig = Figment::new()
            .merge(Serialized::defaults(RavenConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &RavenConfig) -> Result<(), ConfigError> {
        if config.max_concurrency < 1 {
            return Err(ConfigError::InvalidMaxConcurrency(config.max_concurrency));
        }
        if config.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.max_retries));
        }
        if config.initial_backoff_ms >= config.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(config.initial_backoff_ms, config.max_backoff_ms));
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&config.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log_level.clone()));
        }
        Ok(())
    }
}
