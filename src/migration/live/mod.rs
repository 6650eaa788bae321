//! Live migration of a stream that keeps receiving writes.
//!
//! The executor copies the source onto the target until the target has
//! caught up, then closes the source with a marker appended right after
//! the last verified business event. The marker append is the optimistic
//! concurrency check: any event that lands on the source between the final
//! catch-up and the close makes the append conflict, and the loop starts
//! over. Writers to the source are never blocked.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::LiveMigrationContext;
use super::cutover::{perform_cutover, CutoverRequest};
use super::error::MigrationError;
use super::progress::{EventCopyProgress, LiveMigrationProgress, LiveMigrationState};
use super::result::{CloseOutcome, LiveFailureKind, LiveMigrationOutcome, LiveMigrationResult};
use crate::model::{
    last_business_version, Event, ObjectDocument, StreamClosed, StreamInformation,
    TerminationReason,
};
use crate::storage::{read_all_or_empty, StorageError};
use crate::transform::{TransformError, TransformSummary};

/// Runs live migrations. Stateless; one instance can serve any number of
/// concurrent attempts.
#[derive(Debug, Clone, Default)]
pub struct LiveMigrationExecutor;

impl LiveMigrationExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Migrate `ctx.source_stream` onto `ctx.target` and cut the document
    /// over.
    ///
    /// Never returns an error: every failure, including cancellation, is
    /// reported through the result's outcome.
    #[tracing::instrument(
        name = "migration.live",
        skip_all,
        fields(
            migration_id = %ctx.migration_id,
            object_id = %ctx.document.object_id,
            source = %ctx.source_stream.stream_identifier,
            target = %ctx.target.stream_identifier,
        )
    )]
    pub async fn execute(
        &self,
        ctx: &LiveMigrationContext,
        cancel: &CancellationToken,
    ) -> LiveMigrationResult {
        info!("Starting live migration");

        let mut attempt = LiveAttempt::new(ctx, cancel);
        let run = attempt.run().await;
        attempt.finish(run)
    }
}

/// Why an attempt stopped without completing.
enum Abort {
    TimedOut,
    IterationLimit,
    Failed(MigrationError),
}

impl From<MigrationError> for Abort {
    fn from(e: MigrationError) -> Self {
        Abort::Failed(e)
    }
}

impl From<StorageError> for Abort {
    fn from(e: StorageError) -> Self {
        Abort::Failed(e.into())
    }
}

impl From<serde_json::Error> for Abort {
    fn from(e: serde_json::Error) -> Self {
        Abort::Failed(e.into())
    }
}

/// Outcome of one close attempt.
enum CloseStep {
    Done(CloseOutcome, Option<ObjectDocument>),
    Conflict,
}

/// An event ready to be written to the target.
struct CopiedEvent {
    event: Event,
    transformation: Option<TransformSummary>,
}

/// Counters and state for one attempt. Owned by a single task.
struct LiveAttempt<'a> {
    ctx: &'a LiveMigrationContext,
    cancel: &'a CancellationToken,
    target: StreamInformation,
    started: Instant,
    state: LiveMigrationState,
    iterations: u32,
    total_events_copied: u64,
    events_skipped: u64,
    /// Highest source version copied or skipped by this attempt.
    processed_through: i64,
    source_version: i64,
    target_version: i64,
}

impl<'a> LiveAttempt<'a> {
    fn new(ctx: &'a LiveMigrationContext, cancel: &'a CancellationToken) -> Self {
        Self {
            ctx,
            cancel,
            target: ctx.target_stream(),
            started: Instant::now(),
            state: LiveMigrationState::Idle,
            iterations: 0,
            total_events_copied: 0,
            events_skipped: 0,
            processed_through: -1,
            source_version: -1,
            target_version: -1,
        }
    }

    fn transition(&mut self, next: LiveMigrationState) {
        debug!(from = ?self.state, to = ?next, "Live migration state change");
        self.state = next;
    }

    fn source(&self) -> &'a StreamInformation {
        &self.ctx.source_stream
    }

    async fn run(&mut self) -> Result<(CloseOutcome, Option<ObjectDocument>), Abort> {
        self.ctx.validate()?;
        self.transition(LiveMigrationState::CatchingUp);

        loop {
            self.check_budget()?;
            self.iterations += 1;

            if !self.catch_up().await? {
                self.delay().await?;
                continue;
            }

            self.transition(LiveMigrationState::Synced);
            let verified = self.source_version;
            match self.attempt_close(verified).await? {
                CloseStep::Done(outcome, document) => return Ok((outcome, document)),
                CloseStep::Conflict => {
                    self.transition(LiveMigrationState::ConflictDetected);
                    self.transition(LiveMigrationState::CatchingUp);
                }
            }
        }
    }

    fn check_budget(&self) -> Result<(), Abort> {
        if self.cancel.is_cancelled() {
            return Err(Abort::Failed(MigrationError::Cancelled));
        }
        if self.started.elapsed() >= self.ctx.options.close_timeout {
            return Err(Abort::TimedOut);
        }
        let max = self.ctx.options.max_iterations;
        if max > 0 && self.iterations >= max {
            return Err(Abort::IterationLimit);
        }
        Ok(())
    }

    async fn delay(&self) -> Result<(), Abort> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Abort::Failed(MigrationError::Cancelled)),
            _ = tokio::time::sleep(self.ctx.options.catch_up_delay) => Ok(()),
        }
    }

    /// One catch-up pass. Returns whether the target has caught up with
    /// the source as re-read after the copy.
    async fn catch_up(&mut self) -> Result<bool, Abort> {
        let ctx = self.ctx;
        let source_events =
            read_all_or_empty(ctx.source_store.as_ref(), self.source(), self.cancel).await?;
        let target_events =
            read_all_or_empty(ctx.target_store.as_ref(), &self.target, self.cancel).await?;
        self.target_version = last_business_version(&target_events);
        self.processed_through = self.processed_through.max(self.target_version);

        if source_events.iter().any(Event::is_stream_closed) {
            // Closed by an earlier or concurrent attempt; the close step
            // decides what that means for us.
            self.source_version = last_business_version(&source_events);
            self.report_progress(0, true);
            return Ok(true);
        }

        let floor = self.processed_through;
        let pending: Vec<Event> = source_events
            .into_iter()
            .filter(|e| !e.is_stream_closed() && e.event_version > floor)
            .collect();

        let copied_before = self.total_events_copied;
        let appended = if ctx.options.before_append.is_some() {
            self.copy_individually(pending).await?
        } else {
            self.copy_batch(pending).await?
        };
        if !appended {
            self.transition(LiveMigrationState::ConflictDetected);
            self.transition(LiveMigrationState::CatchingUp);
        }
        let copied_now = self.total_events_copied - copied_before;

        let source_events =
            read_all_or_empty(ctx.source_store.as_ref(), self.source(), self.cancel).await?;
        self.source_version = last_business_version(&source_events);
        let closed = source_events.iter().any(Event::is_stream_closed);
        let synced = appended && (closed || self.processed_through >= self.source_version);

        self.report_progress(copied_now, synced);
        Ok(synced)
    }

    /// Log the iteration and hand a snapshot to the progress callback.
    fn report_progress(&self, copied_now: u64, synced: bool) {
        debug!(
            iteration = self.iterations,
            source_version = self.source_version,
            target_version = self.target_version,
            copied = copied_now,
            synced,
            "Catch-up iteration"
        );
        if let Some(on_progress) = &self.ctx.options.on_progress {
            on_progress(&LiveMigrationProgress {
                iteration: self.iterations,
                source_version: self.source_version,
                target_version: self.target_version,
                events_copied_this_iteration: copied_now,
                total_events_copied: self.total_events_copied,
                elapsed: self.started.elapsed(),
                is_synced: synced,
            });
        }
    }

    /// Transform and append `pending` as a single batch. Returns false if
    /// the target moved underneath us.
    async fn copy_batch(&mut self, pending: Vec<Event>) -> Result<bool, Abort> {
        let Some(last) = pending.last().map(|e| e.event_version) else {
            return Ok(true);
        };

        let mut batch = Vec::with_capacity(pending.len());
        let mut skipped = 0;
        for event in pending {
            match self.prepare(event).await? {
                Some(copied) => batch.push(copied),
                None => skipped += 1,
            }
        }

        if let Some(highest) = batch.last().map(|c| c.event.event_version) {
            let events = batch.iter().map(|c| c.event.clone()).collect();
            match self
                .ctx
                .target_store
                .append(&self.target, true, events, self.cancel)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_conflict() => {
                    warn!(error = %e, "Target changed during catch-up, retrying");
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
            self.target_version = highest;
            for copied in batch {
                self.record_copy(copied);
            }
        }

        self.events_skipped += skipped;
        self.processed_through = self.processed_through.max(last);
        Ok(true)
    }

    /// Transform, hook and append one event at a time.
    async fn copy_individually(&mut self, pending: Vec<Event>) -> Result<bool, Abort> {
        for event in pending {
            let version = event.event_version;
            match self.prepare(event).await? {
                None => self.events_skipped += 1,
                Some(copied) => match self.append_one(copied).await {
                    Ok(()) => {}
                    Err(MigrationError::Storage(e)) if e.is_conflict() => {
                        warn!(error = %e, "Target changed during catch-up, retrying");
                        return Ok(false);
                    }
                    Err(e) => return Err(e.into()),
                },
            }
            self.processed_through = self.processed_through.max(version);
        }
        Ok(true)
    }

    /// Run the hook, if any, then append a single event to the target.
    async fn append_one(&mut self, copied: CopiedEvent) -> Result<(), MigrationError> {
        let version = copied.event.event_version;
        if let Some(hook) = &self.ctx.options.before_append {
            hook(&copied.event)
                .await
                .map_err(|e| MigrationError::Hook {
                    event_version: version,
                    message: e.to_string(),
                })?;
        }
        self.ctx
            .target_store
            .append(&self.target, true, vec![copied.event.clone()], self.cancel)
            .await?;
        self.target_version = version;
        self.record_copy(copied);
        Ok(())
    }

    fn record_copy(&mut self, copied: CopiedEvent) {
        self.total_events_copied += 1;
        if let Some(on_event_copied) = &self.ctx.options.on_event_copied {
            on_event_copied(&EventCopyProgress {
                event_type: copied.event.event_type,
                event_version: copied.event.event_version,
                transformation: copied.transformation,
                total_events_copied: self.total_events_copied,
            });
        }
    }

    /// Apply the transformer. `None` means the event is skipped.
    async fn prepare(&self, event: Event) -> Result<Option<CopiedEvent>, Abort> {
        let Some(transformer) = &self.ctx.transformer else {
            return Ok(Some(CopiedEvent {
                event,
                transformation: None,
            }));
        };

        match transformer.transform(event.clone(), self.cancel).await {
            Ok(mut out) => {
                out.event_version = event.event_version;
                let transformation = TransformSummary::between(&event, &out);
                Ok(Some(CopiedEvent {
                    event: out,
                    transformation,
                }))
            }
            Err(TransformError::Cancelled) => Err(Abort::Failed(MigrationError::Cancelled)),
            Err(e) => {
                warn!(
                    event_type = %event.event_type,
                    event_version = event.event_version,
                    error = %e,
                    "Transformation failed, skipping event"
                );
                Ok(None)
            }
        }
    }

    /// Close the source at `verified + 1` and cut the document over.
    async fn attempt_close(&mut self, verified: i64) -> Result<CloseStep, Abort> {
        self.transition(LiveMigrationState::AttemptingClose);
        let ctx = self.ctx;
        let source = self.source();

        let events = read_all_or_empty(ctx.source_store.as_ref(), source, self.cancel).await?;
        if let Some(marker) = events.iter().find(|e| e.is_stream_closed()) {
            let closed: StreamClosed = serde_json::from_value(marker.payload.clone())?;
            return self.already_closed(closed, &events).await;
        }

        let current = last_business_version(&events);
        if current != verified {
            warn!(verified, current, "Source moved before close, catching up again");
            return Ok(CloseStep::Conflict);
        }

        let document = ctx
            .document_store
            .get(&ctx.document.object_name, &ctx.document.object_id)
            .await?;
        if document.active.stream_identifier != source.stream_identifier {
            info!(
                active = %document.active.stream_identifier,
                "Object already redirected by another migration"
            );
            return Ok(CloseStep::Done(
                CloseOutcome::RedirectedElsewhere {
                    active_stream_id: document.active.stream_identifier,
                },
                None,
            ));
        }

        let marker = Event::stream_closed(
            &StreamClosed {
                continuation_stream_id: self.target.stream_identifier.clone(),
                continuation_stream_type: self.target.stream_type.clone(),
                continuation_data_store: self.target.data_store.clone(),
                continuation_document_store: self.target.document_store.clone(),
                continuation_stream_connection_name: self.target.stream_connection_name.clone(),
                reason: TerminationReason::Migration,
                migration_id: ctx.migration_id,
                last_business_event_version: verified,
                closed_at: Utc::now(),
            },
            verified + 1,
        )?;
        match ctx
            .source_store
            .append(source, true, vec![marker], self.cancel)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_conflict() || e.is_closed() => {
                warn!(error = %e, "Close marker conflicted, catching up again");
                return Ok(CloseStep::Conflict);
            }
            Err(e) => return Err(e.into()),
        }
        self.transition(LiveMigrationState::Closed);
        info!(version = verified + 1, "Source stream closed");

        let final_version = self.copy_slipped().await?;
        let (outcome, document) = self
            .cut_over(document, final_version, CloseOutcome::PerformedCutover)
            .await?;
        Ok(CloseStep::Done(outcome, document))
    }

    /// The source already carries a close marker.
    async fn already_closed(
        &mut self,
        closed: StreamClosed,
        events: &[Event],
    ) -> Result<CloseStep, Abort> {
        let ctx = self.ctx;
        self.source_version = last_business_version(events);
        let already = CloseOutcome::AlreadyClosed {
            continuation_stream_id: closed.continuation_stream_id.clone(),
        };
        if closed.continuation_stream_id != self.target.stream_identifier {
            info!(continuation = %closed.continuation_stream_id, "Source already closed");
            return Ok(CloseStep::Done(already, None));
        }

        let document = ctx
            .document_store
            .get(&ctx.document.object_name, &ctx.document.object_id)
            .await?;
        if document.active.stream_identifier != self.source().stream_identifier {
            info!(continuation = %closed.continuation_stream_id, "Source already closed");
            return Ok(CloseStep::Done(already, None));
        }

        // Closed toward our target but never cut over.
        info!(
            closed_by = %closed.migration_id,
            "Resuming interrupted cutover"
        );
        self.transition(LiveMigrationState::Closed);
        let final_version = self.copy_slipped().await?;
        let (outcome, document) = self
            .cut_over(document, final_version, CloseOutcome::ResumedCutover)
            .await?;
        Ok(CloseStep::Done(outcome, document))
    }

    /// Copy business events that are on the source but not yet on the
    /// target after the close. Returns the final source business version.
    async fn copy_slipped(&mut self) -> Result<i64, Abort> {
        let ctx = self.ctx;
        let events = read_all_or_empty(ctx.source_store.as_ref(), self.source(), self.cancel).await?;
        let target_events =
            read_all_or_empty(ctx.target_store.as_ref(), &self.target, self.cancel).await?;
        self.target_version = last_business_version(&target_events);

        let floor = self.target_version.max(self.processed_through);
        let final_version = last_business_version(&events);
        for event in events
            .into_iter()
            .filter(|e| !e.is_stream_closed() && e.event_version > floor)
        {
            let version = event.event_version;
            debug!(event_version = version, "Copying event written during close");
            match self.prepare(event).await? {
                Some(copied) => self.append_one(copied).await?,
                None => self.events_skipped += 1,
            }
            self.processed_through = self.processed_through.max(version);
        }
        self.source_version = final_version;
        Ok(final_version)
    }

    /// Persist the cutover, tolerating a concurrent document update that
    /// left the object on the source.
    async fn cut_over(
        &mut self,
        mut document: ObjectDocument,
        source_version: i64,
        outcome: CloseOutcome,
    ) -> Result<(CloseOutcome, Option<ObjectDocument>), Abort> {
        self.transition(LiveMigrationState::UpdatingDocument);
        let ctx = self.ctx;
        let mut retried = false;

        loop {
            let request = CutoverRequest {
                target: &ctx.target,
                source_version,
                target_version: self.target_version,
                reason: TerminationReason::Migration,
                migration_id: ctx.migration_id,
            };
            match perform_cutover(ctx.document_store.as_ref(), &document, request).await {
                Ok(updated) => return Ok((outcome, Some(updated))),
                Err(e) if e.is_conflict() && !retried => {
                    warn!(error = %e, "Document changed during cutover, reloading");
                    retried = true;
                    document = ctx
                        .document_store
                        .get(&ctx.document.object_name, &ctx.document.object_id)
                        .await?;
                    if document.active.stream_identifier != self.source().stream_identifier {
                        return Ok((
                            CloseOutcome::RedirectedElsewhere {
                                active_stream_id: document.active.stream_identifier,
                            },
                            None,
                        ));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn finish(
        mut self,
        run: Result<(CloseOutcome, Option<ObjectDocument>), Abort>,
    ) -> LiveMigrationResult {
        let elapsed: Duration = self.started.elapsed();
        let outcome = match run {
            Ok((close, document)) => {
                self.transition(LiveMigrationState::Completed);
                info!(
                    outcome = ?close,
                    iterations = self.iterations,
                    copied = self.total_events_copied,
                    skipped = self.events_skipped,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Live migration completed"
                );
                return self.result(LiveMigrationOutcome::Completed(close), document, elapsed);
            }
            Err(abort) => {
                self.transition(LiveMigrationState::Failed);
                let (kind, message, error) = classify(abort, &self.ctx.options.close_timeout);
                error!(
                    kind = ?kind,
                    iterations = self.iterations,
                    error = %message,
                    "Live migration failed"
                );
                LiveMigrationOutcome::Failed {
                    kind,
                    message,
                    error,
                }
            }
        };
        self.result(outcome, None, elapsed)
    }

    fn result(
        &self,
        outcome: LiveMigrationOutcome,
        document: Option<ObjectDocument>,
        elapsed: Duration,
    ) -> LiveMigrationResult {
        LiveMigrationResult {
            migration_id: self.ctx.migration_id,
            source_stream_id: self.ctx.source_stream.stream_identifier.clone(),
            target_stream_id: self.target.stream_identifier.clone(),
            outcome,
            iterations: self.iterations,
            total_events_copied: self.total_events_copied,
            events_skipped: self.events_skipped,
            source_version: self.source_version,
            target_version: self.target_version,
            elapsed,
            document,
        }
    }
}

fn classify(
    abort: Abort,
    timeout: &Duration,
) -> (LiveFailureKind, String, Option<MigrationError>) {
    match abort {
        Abort::TimedOut => (
            LiveFailureKind::TimedOut,
            format!("Target did not catch up within {:?}", timeout),
            None,
        ),
        Abort::IterationLimit => (
            LiveFailureKind::IterationLimitExceeded,
            "Catch-up iteration limit exceeded".to_string(),
            None,
        ),
        Abort::Failed(e) => {
            let kind = if e.is_cancellation() {
                LiveFailureKind::Cancelled
            } else {
                match e {
                    MigrationError::InvalidContext(_) => LiveFailureKind::InvalidContext,
                    MigrationError::Storage(_) => LiveFailureKind::Storage,
                    _ => LiveFailureKind::Unexpected,
                }
            };
            (kind, e.to_string(), Some(e))
        }
    }
}

#[cfg(test)]
mod tests;
