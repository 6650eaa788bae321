//! Background lease renewal for the saga executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock::DistributedLock;

/// Renews a lock at a fixed interval until stopped.
///
/// A refused or failed renewal cancels `run_token`, so the phases running
/// under it stop at their next suspension point.
pub(crate) struct Heartbeat {
    stop: CancellationToken,
    lost: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start renewing. A zero interval disables renewal.
    pub(crate) fn start(
        lock: Arc<dyn DistributedLock>,
        interval: Duration,
        run_token: CancellationToken,
    ) -> Self {
        let stop = run_token.child_token();
        let lost = Arc::new(AtomicBool::new(false));

        if interval.is_zero() {
            debug!(key = %lock.key(), "Lock renewal disabled");
            return Self {
                stop,
                lost,
                handle: None,
            };
        }

        let handle = tokio::spawn(renew_loop(
            lock,
            interval,
            run_token,
            stop.clone(),
            lost.clone(),
        ));

        Self {
            stop,
            lost,
            handle: Some(handle),
        }
    }

    /// Stop renewing. Returns whether the lease was lost while running.
    pub(crate) async fn stop(self) -> bool {
        self.stop.cancel();
        if let Some(handle) = self.handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Lock renewal task ended abnormally");
            }
        }
        self.lost.load(Ordering::SeqCst)
    }
}

async fn renew_loop(
    lock: Arc<dyn DistributedLock>,
    interval: Duration,
    run_token: CancellationToken,
    stop: CancellationToken,
    lost: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the lease is fresh.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match lock.renew(&stop).await {
            Ok(true) => {
                debug!(key = %lock.key(), expires_at = %lock.expires_at(), "Lock renewed");
            }
            Ok(false) => {
                warn!(key = %lock.key(), "Lock lease lost, aborting migration");
                lost.store(true, Ordering::SeqCst);
                run_token.cancel();
                return;
            }
            Err(_) if stop.is_cancelled() => return,
            Err(e) => {
                warn!(key = %lock.key(), error = %e, "Lock renewal failed, aborting migration");
                lost.store(true, Ordering::SeqCst);
                run_token.cancel();
                return;
            }
        }
    }
}
