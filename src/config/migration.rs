//! Executor and lock configuration types.

use serde::Deserialize;

/// Live migration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveMigrationConfig {
    /// Elapsed-time budget for catch-up and close. Default: 300000 (5 minutes).
    pub close_timeout_ms: u64,
    /// Pause between catch-up iterations while the target is behind. Default: 100.
    pub catch_up_delay_ms: u64,
    /// Maximum catch-up iterations; 0 means unlimited. Default: 1000.
    pub max_iterations: u32,
}

impl Default for LiveMigrationConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: 300_000,
            catch_up_delay_ms: 100,
            max_iterations: 1000,
        }
    }
}

/// Saga migration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SagaMigrationConfig {
    /// Plan only, write nothing. Default: false.
    pub dry_run: bool,
    /// Run the backup phase. Default: false.
    pub enable_backup: bool,
    /// Run the verification phase. Default: true.
    pub enable_verification: bool,
    /// Append a close marker to the source after cutover. Default: false.
    pub enable_book_closing: bool,
    /// Run the rollback handler when an attempt fails. Default: true.
    pub supports_rollback: bool,
    /// Abort on the first transformation failure instead of skipping. Default: false.
    pub fail_fast_on_transform_error: bool,
    /// Keep original event timestamps on the target. Default: true.
    pub preserve_timestamps: bool,
}

impl Default for SagaMigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            enable_backup: false,
            enable_verification: true,
            enable_book_closing: false,
            supports_rollback: true,
            fail_fast_on_transform_error: false,
            preserve_timestamps: true,
        }
    }
}

/// Distributed lock configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long to wait for the migration lock. Default: 30000.
    pub timeout_ms: u64,
    /// Interval between lease renewals. Default: 10000.
    pub heartbeat_interval_ms: u64,
    /// Lease length granted on acquire and renew. Default: 60000.
    pub lease_duration_ms: u64,
    /// Poll interval while waiting for a held lock. Default: 250.
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            heartbeat_interval_ms: 10_000,
            lease_duration_ms: 60_000,
            poll_interval_ms: 250,
        }
    }
}
