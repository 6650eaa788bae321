//! Bootstrap helpers for hosts embedding the migration engine.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, MigrationConfig, LOG_ENV_VAR};

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initialize tracing with the STREAM_MIGRATION_LOG environment variable.
///
/// Defaults to "info" level if STREAM_MIGRATION_LOG is not set. Panics if a
/// global subscriber is already installed; use [`try_init_tracing`] where
/// that can happen.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like [`init_tracing`], but returns false instead of panicking when a
/// global subscriber is already installed.
pub fn try_init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Install tracing and load configuration from the usual sources.
pub fn bootstrap(config_path: Option<&str>) -> Result<MigrationConfig, ConfigError> {
    try_init_tracing();
    let config = MigrationConfig::load(config_path)?;
    info!(
        close_timeout_ms = config.live.close_timeout_ms,
        lock_timeout_ms = config.lock.timeout_ms,
        dry_run = config.saga.dry_run,
        "Migration configuration loaded"
    );
    Ok(config)
}
