//! Layered configuration loading with figment.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Agent name cannot be empty")]
    EmptyAgentName,

    #[error("Control plane base URL cannot be empty")]
    EmptyBaseUrl,

    #[error("Invalid control plane base URL: {0}. Must start with http:// or https://")]
    InvalidBaseUrl(String),

    #[error("Invalid pull_size: {0}. Must be at least 1")]
    InvalidPullSize(usize),

    #[error("Invalid conflict_retry_attempts: {0}. Must be at least 1")]
    InvalidConflictRetryAttempts(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Environment variables understood for compatibility with existing
/// deployments, mapped onto their configuration keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("API_SERVICE_URL", "control_plane.base_url"),
    ("AGENT_NAME", "agent.name"),
    ("TOKEN", "agent.token"),
    ("TERMINAL_BASE_URL", "agent.terminal_base_url"),
    ("TERMINAL_API_VERSION", "agent.terminal_api_version"),
    ("PULL_SIZE", "puller.pull_size"),
    ("LIGHTHOUSE_ENABLED", "kube_events.enabled"),
];

fn legacy_key(name: &str) -> Option<&'static str> {
    LEGACY_ENV
        .iter()
        .find(|(legacy, _)| legacy.eq_ignore_ascii_case(name))
        .map(|(_, key)| *key)
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .ci-agent/config.yaml
    /// 3. .ci-agent/local.yaml (optional overrides)
    /// 4. Legacy environment variables (`API_SERVICE_URL`, `AGENT_NAME`, ...)
    /// 5. `CI_AGENT_*` environment variables, `__` separating sections
    pub fn load() -> Result<Config> {
        let config = Self::figment(Path::new(".ci-agent/config.yaml"))
            .merge(Yaml::file(".ci-agent/local.yaml"))
            .merge(Self::legacy_env())
            .merge(Env::prefixed("CI_AGENT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::finish(config)
    }

    /// Load configuration from a specific file, still honouring the environment
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config = Self::figment(path.as_ref())
            .merge(Self::legacy_env())
            .merge(Env::prefixed("CI_AGENT_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::finish(config)
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file))
    }

    fn legacy_env() -> Env {
        Env::raw().filter_map(|name| legacy_key(name.as_str()).map(Into::into))
    }

    fn finish(mut config: Config) -> Result<Config> {
        // Older deployments configure the URL with a leading slash.
        config.control_plane.base_url = config
            .control_plane
            .base_url
            .trim_start_matches('/')
            .trim_end_matches('/')
            .to_string();

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.agent.name.trim().is_empty() {
            return Err(ConfigError::EmptyAgentName);
        }

        let base_url = &config.control_plane.base_url;
        if base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(base_url.clone()));
        }

        if config.puller.pull_size == 0 {
            return Err(ConfigError::InvalidPullSize(config.puller.pull_size));
        }

        if config.reconcile.conflict_retry_attempts == 0 {
            return Err(ConfigError::InvalidConflictRetryAttempts(
                config.reconcile.conflict_retry_attempts,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}
