//! Phased migration of a quiesced stream under a distributed lock.
//!
//! Only one saga migration per object runs at a time: the executor holds
//! the object's migration lock for the whole attempt, renews it in the
//! background and releases it on every exit path.

mod heartbeat;
pub mod phases;

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use self::heartbeat::Heartbeat;
use self::phases::{
    AnalyzePhase, BackupPhase, BookClosingPhase, CopyTransformPhase, CutoverPhase,
    RestoreDocument, RollbackHandler, SagaPhase, VerifyPhase,
};
use super::context::MigrationContext;
use super::error::{MigrationError, Result};
use super::progress::{MigrationPhase, MigrationProgress};
use super::result::{MigrationPlan, MigrationResult, MigrationStatistics, MigrationStatus};
use crate::lock::{migration_lock_key, DistributedLock, DistributedLockProvider};
use crate::model::{Event, ObjectDocument};

/// State of one saga attempt, shared by its phases.
#[derive(Debug)]
pub struct SagaRun {
    pub statistics: MigrationStatistics,
    pub completed_phases: Vec<MigrationPhase>,
    /// Source events loaded by the analyze phase.
    pub source_events: Vec<Event>,
    /// Events the copy phase wrote to the target.
    pub copied: Vec<Event>,
    /// Last business-event version on the source (-1 if none).
    pub source_version: i64,
    /// Last event version written to the target (-1 if none).
    pub target_version: i64,
    pub backup_location: Option<String>,
    /// Document as it was before the cutover, once the cutover persisted.
    pub original_document: Option<ObjectDocument>,
    pub cutover_document: Option<ObjectDocument>,
    pub book_closed: bool,
    started: Instant,
}

impl SagaRun {
    fn new() -> Self {
        Self {
            statistics: MigrationStatistics::start(),
            completed_phases: Vec::new(),
            source_events: Vec::new(),
            copied: Vec::new(),
            source_version: -1,
            target_version: -1,
            backup_location: None,
            original_document: None,
            cutover_document: None,
            book_closed: false,
            started: Instant::now(),
        }
    }

    /// Send a progress snapshot for `phase` to the context's callback.
    pub fn report(&self, ctx: &MigrationContext, phase: MigrationPhase) {
        if let Some(on_progress) = &ctx.options.on_progress {
            on_progress(&MigrationProgress {
                phase,
                events_processed: self.statistics.events_processed,
                total_events: self.statistics.total_events,
                elapsed: self.started.elapsed(),
            });
        }
    }

    fn enter(&self, ctx: &MigrationContext, phase: MigrationPhase) {
        info!(phase = %phase, "Entering migration phase");
        self.report(ctx, phase);
    }

    fn into_result(
        self,
        ctx: &MigrationContext,
        status: MigrationStatus,
        plan: Option<MigrationPlan>,
        rolled_back: bool,
        error: Option<MigrationError>,
    ) -> MigrationResult {
        let elapsed = self.started.elapsed();
        MigrationResult {
            migration_id: ctx.migration_id,
            status,
            source_stream_id: ctx.source_stream().stream_identifier.clone(),
            target_stream_id: ctx.target.stream_identifier.clone(),
            statistics: self.statistics.finish(elapsed),
            completed_phases: self.completed_phases,
            plan,
            rolled_back,
            error_message: error.as_ref().map(ToString::to_string),
            error,
            document: self.cutover_document,
        }
    }
}

/// Runs saga migrations.
pub struct SagaMigrationExecutor {
    lock_provider: Arc<dyn DistributedLockProvider>,
    phases: Vec<Arc<dyn SagaPhase>>,
    rollback: Arc<dyn RollbackHandler>,
}

impl SagaMigrationExecutor {
    /// Executor with the default phase handlers.
    pub fn new(lock_provider: Arc<dyn DistributedLockProvider>) -> Self {
        Self {
            lock_provider,
            phases: vec![
                Arc::new(BackupPhase),
                Arc::new(AnalyzePhase),
                Arc::new(CopyTransformPhase),
                Arc::new(VerifyPhase),
                Arc::new(CutoverPhase),
                Arc::new(BookClosingPhase),
            ],
            rollback: Arc::new(RestoreDocument),
        }
    }

    /// Replace the handler for `phase.kind()`, or append it if no phase of
    /// that kind is registered.
    pub fn with_phase(mut self, phase: Arc<dyn SagaPhase>) -> Self {
        match self.phases.iter_mut().find(|p| p.kind() == phase.kind()) {
            Some(slot) => *slot = phase,
            None => self.phases.push(phase),
        }
        self
    }

    pub fn with_rollback(mut self, rollback: Arc<dyn RollbackHandler>) -> Self {
        self.rollback = rollback;
        self
    }

    /// Phases a run with `ctx` would execute, in order.
    pub fn plan(&self, ctx: &MigrationContext) -> MigrationPlan {
        let mut phases = vec![MigrationPhase::AcquireLock];
        phases.extend(
            self.phases
                .iter()
                .filter(|p| p.enabled(&ctx.options))
                .map(|p| p.kind()),
        );
        phases.push(MigrationPhase::ReleaseLock);

        MigrationPlan {
            source_stream_id: ctx.source_stream().stream_identifier.clone(),
            target_stream_id: ctx.target.stream_identifier.clone(),
            phases,
            is_feasible: ctx.validate().is_ok(),
        }
    }

    /// Run one saga migration.
    ///
    /// Failures are reported through the result; only cancellation by the
    /// caller is returned as `Err(MigrationError::Cancelled)`, after any
    /// persisted cutover has been compensated.
    #[tracing::instrument(
        name = "migration.saga",
        skip_all,
        fields(
            migration_id = %ctx.migration_id,
            object_id = %ctx.document.object_id,
            source = %ctx.document.active.stream_identifier,
            target = %ctx.target.stream_identifier,
        )
    )]
    pub async fn execute(
        &self,
        ctx: MigrationContext,
        cancel: CancellationToken,
    ) -> Result<MigrationResult> {
        let mut run = SagaRun::new();

        if ctx.options.dry_run {
            let plan = self.plan(&ctx);
            info!(feasible = plan.is_feasible, "Dry run, no changes made");
            return Ok(run.into_result(&ctx, MigrationStatus::DryRun, Some(plan), false, None));
        }

        if let Err(e) = ctx.validate() {
            error!(error = %e, "Saga migration rejected");
            return Ok(run.into_result(&ctx, MigrationStatus::Failed, None, false, Some(e)));
        }
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        info!("Starting saga migration");
        let key = migration_lock_key(&ctx.document.object_name, &ctx.document.object_id);
        run.enter(&ctx, MigrationPhase::AcquireLock);

        let lock: Arc<dyn DistributedLock> = match self
            .lock_provider
            .acquire_lock(&key, ctx.options.lock_timeout, &cancel)
            .await
        {
            Ok(Some(lock)) => Arc::from(lock),
            Ok(None) => {
                let e = MigrationError::LockNotAcquired {
                    key,
                    timeout: ctx.options.lock_timeout,
                };
                error!(error = %e, "Saga migration failed");
                return Ok(run.into_result(&ctx, MigrationStatus::Failed, None, false, Some(e)));
            }
            Err(e) => {
                let e = MigrationError::from(e);
                if e.is_cancellation() {
                    return Err(MigrationError::Cancelled);
                }
                error!(error = %e, "Saga migration failed");
                return Ok(run.into_result(&ctx, MigrationStatus::Failed, None, false, Some(e)));
            }
        };

        run.completed_phases.push(MigrationPhase::AcquireLock);

        let run_token = cancel.child_token();
        let heartbeat = Heartbeat::start(
            lock.clone(),
            ctx.options.heartbeat_interval,
            run_token.clone(),
        );
        let outcome = self.run_phases(&ctx, &mut run, &run_token).await;
        let lock_lost = heartbeat.stop().await;

        let (status, rolled_back, error) = match outcome {
            Ok(()) => (MigrationStatus::Completed, false, None),
            Err(e) if e.is_cancellation() && cancel.is_cancelled() => {
                warn!("Saga migration cancelled, compensating");
                // The caller's token is already cancelled; compensation must
                // still reach the stores.
                self.roll_back(&ctx, &mut run, &CancellationToken::new())
                    .await;
                release(lock.as_ref()).await;
                return Err(MigrationError::Cancelled);
            }
            Err(e) => {
                let e = if lock_lost {
                    MigrationError::LockLost { key: key.clone() }
                } else {
                    e
                };
                error!(error = %e, "Saga migration failed");
                let rolled_back = self.roll_back(&ctx, &mut run, &cancel).await;
                (MigrationStatus::Failed, rolled_back, Some(e))
            }
        };

        run.enter(&ctx, MigrationPhase::ReleaseLock);
        release(lock.as_ref()).await;
        run.completed_phases.push(MigrationPhase::ReleaseLock);

        let result = run.into_result(&ctx, status, None, rolled_back, error);
        if result.is_success() {
            info!(
                events = result.statistics.events_processed,
                transformed = result.statistics.events_transformed,
                failures = result.statistics.transformation_failures,
                elapsed_ms = result.statistics.elapsed.as_millis() as u64,
                "Saga migration completed"
            );
        }
        Ok(result)
    }

    async fn run_phases(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for phase in self.phases.iter().filter(|p| p.enabled(&ctx.options)) {
            if cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }
            let kind = phase.kind();
            run.enter(ctx, kind);
            phase.execute(ctx, run, cancel).await?;
            run.completed_phases.push(kind);
        }
        Ok(())
    }

    /// Returns whether compensation succeeded. Not attempted unless the
    /// context declares rollback support.
    async fn roll_back(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> bool {
        if !ctx.options.supports_rollback {
            return false;
        }
        run.enter(ctx, MigrationPhase::Rollback);
        match self.rollback.rollback(ctx, run, cancel).await {
            Ok(()) => {
                run.completed_phases.push(MigrationPhase::Rollback);
                true
            }
            Err(e) => {
                error!(error = %e, "Rollback failed");
                false
            }
        }
    }
}

async fn release(lock: &dyn DistributedLock) {
    match lock.release().await {
        Ok(()) => info!(key = %lock.key(), "Migration lock released"),
        Err(e) => warn!(key = %lock.key(), error = %e, "Failed to release migration lock"),
    }
}
