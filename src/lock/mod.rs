//! Leased, renewable mutual exclusion keyed by object identity.
//!
//! Only single-key leases are provided. A lease expires unless renewed;
//! dropping a lock that was never released releases it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

mod memory;

pub use memory::InMemoryLockProvider;

/// Errors that can occur while acquiring, renewing or releasing locks.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Lock {key} is held by another owner")]
    Contended { key: String },

    #[error("Lock operation cancelled")]
    Cancelled,

    #[error("Lock backend error: {0}")]
    Backend(String),
}

/// Provider of distributed locks.
#[async_trait]
pub trait DistributedLockProvider: Send + Sync {
    /// Try to acquire the lock for `key`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when the lock was not granted in time. A zero
    /// timeout makes a single attempt.
    async fn acquire_lock(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn DistributedLock>>, LockError>;
}

/// A granted lease.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Key the lock was acquired for.
    fn key(&self) -> &str;

    /// Unique id of this grant.
    fn lock_id(&self) -> &str;

    /// When the lease lapses unless renewed.
    fn expires_at(&self) -> DateTime<Utc>;

    /// Extend the lease. `Ok(false)` means the lease is no longer ours.
    async fn renew(&self, cancel: &CancellationToken) -> Result<bool, LockError>;

    /// Release the lease. Releasing twice is a no-op.
    async fn release(&self) -> Result<(), LockError>;
}

/// Lock key used for migrations of one object.
pub fn migration_lock_key(object_name: &str, object_id: &str) -> String {
    format!("migration:{}:{}", object_name, object_id)
}
