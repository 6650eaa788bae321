//! Executor-level errors.

use std::time::Duration;

use crate::lock::LockError;
use crate::storage::StorageError;
use crate::transform::TransformError;

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors that can abort a migration attempt.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Migration lock {key} not acquired within {timeout:?}")]
    LockNotAcquired { key: String, timeout: Duration },

    #[error("Migration lock {key} was lost during the migration")]
    LockLost { key: String },

    #[error("Transformation of {event_type} v{event_version} failed: {source}")]
    Transform {
        event_type: String,
        event_version: i64,
        #[source]
        source: TransformError,
    },

    #[error("Before-append hook failed for v{event_version}: {message}")]
    Hook { event_version: i64, message: String },

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Invalid migration context: {0}")]
    InvalidContext(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Whether the error stems from cancellation, at any layer.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            MigrationError::Cancelled
                | MigrationError::Storage(StorageError::Cancelled)
                | MigrationError::Lock(LockError::Cancelled)
                | MigrationError::Transform {
                    source: TransformError::Cancelled,
                    ..
                }
        )
    }
}
