//! Migration engine configuration.
//!
//! Aggregates the live, saga and lock settings into a single `MigrationConfig`
//! that can be loaded from YAML files or environment variables.

mod migration;

pub use migration::{LiveMigrationConfig, LockConfig, SagaMigrationConfig};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "migration.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "STREAM_MIGRATION_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "STREAM_MIGRATION";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "STREAM_MIGRATION_LOG";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Main migration configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Live (online) migration settings.
    pub live: LiveMigrationConfig,
    /// Saga (batch) migration settings.
    pub saga: SagaMigrationConfig,
    /// Distributed lock settings.
    pub lock: LockConfig,
}

impl MigrationConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `migration.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
