use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory (relative to the project) holding config and run state.
pub const CONFIG_DIR: &str = ".covsynth";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid threshold: {0}. Must be greater than 0 and at most 100")]
    InvalidThreshold(f64),

    #[error("Invalid concurrency: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Invalid iteration budget: {field} cannot be 0")]
    ZeroBudget { field: &'static str },

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Source root cannot be empty")]
    EmptySourceRoot,

    #[error("{0} command cannot be empty")]
    EmptyCommand(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .covsynth/config.yaml (project config)
    /// 3. .covsynth/local.yaml (local overrides, optional)
    /// 4. Environment variables (COVSYNTH_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`load`](Self::load) with the config directory under `project`.
    pub fn load_from_dir(project: impl AsRef<Path>) -> Result<Config> {
        let dir = project.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("COVSYNTH_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("COVSYNTH_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if !(config.threshold > 0.0 && config.threshold <= 100.0) {
            return Err(ConfigError::InvalidThreshold(config.threshold));
        }

        let iteration = &config.iteration;
        if iteration.concurrency == 0 || iteration.concurrency > 64 {
            return Err(ConfigError::InvalidConcurrency(iteration.concurrency));
        }
        let budgets = [
            ("max_attempts_per_unit", u64::from(iteration.max_attempts_per_unit)),
            ("max_consecutive_failures", u64::from(iteration.max_consecutive_failures)),
            ("max_total_iterations", u64::from(iteration.max_total_iterations)),
            ("max_wall_time_secs", iteration.max_wall_time_secs),
            ("fatal_error_threshold", u64::from(iteration.fatal_error_threshold)),
        ];
        if let Some(&(field, _)) = budgets.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroBudget { field });
        }

        // Validate rate_limit
        if !(config.rate_limit.requests_per_second > 0.0) {
            return Err(ConfigError::InvalidRateLimit(
                config.rate_limit.requests_per_second,
            ));
        }

        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        // Layout and toolchain
        if config.layout.source_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptySourceRoot);
        }
        if config.layout.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::ValidationFailed(
                "layout.extension cannot be empty".to_string(),
            ));
        }
        if config.toolchain.compile_command.is_empty() {
            return Err(ConfigError::EmptyCommand("Compile"));
        }
        if config.toolchain.suite_command.is_empty() {
            return Err(ConfigError::EmptyCommand("Suite"));
        }
        if config.toolchain.validation_timeout_secs == 0
            || config.toolchain.measurement_timeout_secs == 0
        {
            return Err(ConfigError::ValidationFailed(
                "toolchain timeouts must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}
