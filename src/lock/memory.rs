//! In-process lock provider.
//!
//! Leases live in a shared map, so every provider clone sees the same locks.
//! Acquisition polls at a constant interval until the timeout elapses; the
//! last poll falls on the deadline even when the timeout is shorter than the
//! configured interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{DistributedLock, DistributedLockProvider, LockError};
use crate::config::LockConfig;

struct Lease {
    lock_id: String,
    deadline: Instant,
}

type Leases = Arc<Mutex<HashMap<String, Lease>>>;

/// Lock provider backed by process memory.
#[derive(Clone)]
pub struct InMemoryLockProvider {
    leases: Leases,
    lease_duration: Duration,
    poll_interval: Duration,
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::from_config(&LockConfig::default())
    }
}

impl InMemoryLockProvider {
    pub fn new(lease_duration: Duration, poll_interval: Duration) -> Self {
        Self {
            leases: Arc::new(Mutex::new(HashMap::new())),
            lease_duration,
            poll_interval,
        }
    }

    pub fn from_config(config: &LockConfig) -> Self {
        Self::new(
            Duration::from_millis(config.lease_duration_ms),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Whether `key` is currently leased.
    pub fn is_locked(&self, key: &str) -> bool {
        self.leases
            .lock()
            .map(|leases| {
                leases
                    .get(key)
                    .is_some_and(|lease| lease.deadline > Instant::now())
            })
            .unwrap_or(false)
    }

    /// Drop the lease for `key` regardless of owner. The owner's next
    /// renewal reports the lease as lost.
    pub fn revoke(&self, key: &str) {
        if let Ok(mut leases) = self.leases.lock() {
            leases.remove(key);
        }
    }

    fn try_acquire(&self, key: &str) -> Result<InMemoryLock, LockError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|e| LockError::Backend(e.to_string()))?;
        let now = Instant::now();
        if leases.get(key).is_some_and(|lease| lease.deadline > now) {
            return Err(LockError::Contended {
                key: key.to_string(),
            });
        }
        let lock_id = Uuid::new_v4().to_string();
        leases.insert(
            key.to_string(),
            Lease {
                lock_id: lock_id.clone(),
                deadline: now + self.lease_duration,
            },
        );
        Ok(InMemoryLock {
            key: key.to_string(),
            lock_id,
            leases: self.leases.clone(),
            lease_duration: self.lease_duration,
            expires_at: Mutex::new(wall_clock_deadline(self.lease_duration)),
        })
    }
}

/// Spread the retries evenly over `timeout`, never slower than `poll`, so
/// the final attempt lands exactly on the deadline.
fn polling_schedule(timeout: Duration, poll: Duration) -> ConstantBuilder {
    let polls = timeout
        .as_nanos()
        .div_ceil(poll.as_nanos().max(1))
        .min(u128::from(u32::MAX)) as u32;
    let delay = if polls == 0 {
        Duration::ZERO
    } else {
        timeout / polls
    };
    ConstantBuilder::default()
        .with_delay(delay)
        .with_max_times(polls as usize)
}

fn wall_clock_deadline(lease: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl DistributedLockProvider for InMemoryLockProvider {
    async fn acquire_lock(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn DistributedLock>>, LockError> {
        let backoff = polling_schedule(timeout, self.poll_interval);

        let attempt = (|| async move { self.try_acquire(key) })
            .retry(backoff)
            .when(|e| matches!(e, LockError::Contended { .. }));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            outcome = attempt => outcome,
        };

        match outcome {
            Ok(lock) => {
                debug!(key = %key, lock_id = %lock.lock_id, "Lock acquired");
                Ok(Some(Box::new(lock)))
            }
            Err(LockError::Contended { .. }) => {
                debug!(key = %key, timeout = ?timeout, "Lock not granted");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Lease granted by [`InMemoryLockProvider`].
pub struct InMemoryLock {
    key: String,
    lock_id: String,
    leases: Leases,
    lease_duration: Duration,
    expires_at: Mutex<DateTime<Utc>>,
}

impl InMemoryLock {
    fn release_now(&self) -> Result<(), LockError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|e| LockError::Backend(e.to_string()))?;
        if leases
            .get(&self.key)
            .is_some_and(|lease| lease.lock_id == self.lock_id)
        {
            leases.remove(&self.key);
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn lock_id(&self) -> &str {
        &self.lock_id
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
            .lock()
            .map(|at| *at)
            .unwrap_or_else(|_| Utc::now())
    }

    async fn renew(&self, cancel: &CancellationToken) -> Result<bool, LockError> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }
        let mut leases = self
            .leases
            .lock()
            .map_err(|e| LockError::Backend(e.to_string()))?;
        let now = Instant::now();
        match leases.get_mut(&self.key) {
            Some(lease) if lease.lock_id == self.lock_id && lease.deadline > now => {
                lease.deadline = now + self.lease_duration;
                if let Ok(mut at) = self.expires_at.lock() {
                    *at = wall_clock_deadline(self.lease_duration);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self) -> Result<(), LockError> {
        self.release_now()
    }
}

impl Drop for InMemoryLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_now() {
            warn!(key = %self.key, error = %e, "Failed to release lock on drop");
        }
    }
}
