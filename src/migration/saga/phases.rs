//! Saga phases and their default handlers.
//!
//! Each phase is a [`SagaPhase`] trait object; the executor runs them in
//! order and any of them can be replaced. Phases communicate through the
//! attempt's [`SagaRun`].

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SagaRun;
use crate::migration::context::{MigrationContext, MigrationOptions};
use crate::migration::cutover::{perform_cutover, CutoverRequest};
use crate::migration::error::{MigrationError, Result};
use crate::migration::progress::MigrationPhase;
use crate::model::{last_business_version, Event, StreamClosed, TerminationReason};
use crate::storage::read_all_or_empty;
use crate::transform::{TransformError, TransformSummary};

/// One step of a saga migration.
#[async_trait]
pub trait SagaPhase: Send + Sync {
    fn kind(&self) -> MigrationPhase;

    /// Whether the phase runs under `options`. Defaults to always.
    fn enabled(&self, _options: &MigrationOptions) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Compensates a failed saga migration.
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    async fn rollback(
        &self,
        ctx: &MigrationContext,
        run: &SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MigrationError::Cancelled);
    }
    Ok(())
}

/// Records that no backup provider is configured.
#[derive(Debug, Default)]
pub struct BackupPhase;

#[async_trait]
impl SagaPhase for BackupPhase {
    fn kind(&self) -> MigrationPhase {
        MigrationPhase::Backup
    }

    fn enabled(&self, options: &MigrationOptions) -> bool {
        options.enable_backup
    }

    async fn execute(
        &self,
        _ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        warn!("No backup provider configured, continuing without backup");
        run.backup_location = None;
        Ok(())
    }
}

/// Loads the source stream and counts its events.
#[derive(Debug, Default)]
pub struct AnalyzePhase;

#[async_trait]
impl SagaPhase for AnalyzePhase {
    fn kind(&self) -> MigrationPhase {
        MigrationPhase::Analyze
    }

    async fn execute(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let events =
            read_all_or_empty(ctx.source_store.as_ref(), ctx.source_stream(), cancel).await?;
        if let Some(marker) = events.iter().find(|e| e.is_stream_closed()) {
            return Err(MigrationError::InvalidContext(format!(
                "source stream {} is already closed at v{}",
                ctx.source_stream().stream_identifier,
                marker.event_version
            )));
        }

        run.source_version = last_business_version(&events);
        run.statistics.total_events = events.len() as u64;
        info!(
            total_events = events.len(),
            source_version = run.source_version,
            "Source analyzed"
        );
        run.source_events = events;
        Ok(())
    }
}

/// Transforms every analyzed event and writes them to the target in one
/// append.
#[derive(Debug, Default)]
pub struct CopyTransformPhase;

#[async_trait]
impl SagaPhase for CopyTransformPhase {
    fn kind(&self) -> MigrationPhase {
        MigrationPhase::CopyTransform
    }

    async fn execute(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let source_events = std::mem::take(&mut run.source_events);
        let mut batch = Vec::with_capacity(source_events.len());

        for event in &source_events {
            ensure_active(cancel)?;
            run.statistics.events_processed += 1;

            let Some(transformer) = &ctx.transformer else {
                batch.push(event.clone());
                run.report(ctx, MigrationPhase::CopyTransform);
                continue;
            };

            match transformer.transform(event.clone(), cancel).await {
                Ok(mut out) => {
                    out.event_version = event.event_version;
                    if TransformSummary::between(event, &out).is_some() {
                        run.statistics.events_transformed += 1;
                    }
                    batch.push(out);
                }
                Err(TransformError::Cancelled) => return Err(MigrationError::Cancelled),
                Err(e) => {
                    run.statistics.transformation_failures += 1;
                    if ctx.options.fail_fast_on_transform_error {
                        return Err(MigrationError::Transform {
                            event_type: event.event_type.clone(),
                            event_version: event.event_version,
                            source: e,
                        });
                    }
                    warn!(
                        event_type = %event.event_type,
                        event_version = event.event_version,
                        error = %e,
                        "Transformation failed, skipping event"
                    );
                }
            }
            run.report(ctx, MigrationPhase::CopyTransform);
        }
        run.source_events = source_events;

        if let Some(last) = batch.last() {
            run.target_version = last.event_version;
            ctx.target_store
                .append(
                    &ctx.target_stream(),
                    ctx.options.preserve_timestamps,
                    batch.clone(),
                    cancel,
                )
                .await?;
        }
        info!(
            copied = batch.len(),
            failures = run.statistics.transformation_failures,
            "Events copied to target"
        );
        run.copied = batch;
        Ok(())
    }
}

/// Compares the target with what the copy phase wrote.
#[derive(Debug, Default)]
pub struct VerifyPhase;

#[async_trait]
impl SagaPhase for VerifyPhase {
    fn kind(&self) -> MigrationPhase {
        MigrationPhase::Verify
    }

    fn enabled(&self, options: &MigrationOptions) -> bool {
        options.enable_verification
    }

    async fn execute(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let target =
            read_all_or_empty(ctx.target_store.as_ref(), &ctx.target_stream(), cancel).await?;

        if target.len() != run.copied.len() {
            return Err(MigrationError::Verification(format!(
                "target has {} events, expected {}",
                target.len(),
                run.copied.len()
            )));
        }
        for (written, stored) in run.copied.iter().zip(&target) {
            if written.event_version != stored.event_version
                || written.event_type != stored.event_type
                || written.payload != stored.payload
            {
                return Err(MigrationError::Verification(format!(
                    "target event v{} does not match the copied event v{}",
                    stored.event_version, written.event_version
                )));
            }
        }
        debug!(events = target.len(), "Target verified");
        Ok(())
    }
}

/// Points the document at the target.
#[derive(Debug, Default)]
pub struct CutoverPhase;

#[async_trait]
impl SagaPhase for CutoverPhase {
    fn kind(&self) -> MigrationPhase {
        MigrationPhase::Cutover
    }

    async fn execute(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let document = ctx
            .document_store
            .get(&ctx.document.object_name, &ctx.document.object_id)
            .await?;
        let source_id = &ctx.source_stream().stream_identifier;
        if document.active.stream_identifier != *source_id {
            return Err(MigrationError::InvalidContext(format!(
                "document points at {}, not the source {}",
                document.active.stream_identifier, source_id
            )));
        }

        let updated = perform_cutover(
            ctx.document_store.as_ref(),
            &document,
            CutoverRequest {
                target: &ctx.target,
                source_version: run.source_version,
                target_version: run.target_version,
                reason: TerminationReason::Migration,
                migration_id: ctx.migration_id,
            },
        )
        .await?;
        run.original_document = Some(document);
        run.cutover_document = Some(updated);
        Ok(())
    }
}

/// Appends a close marker to the source referencing the target.
#[derive(Debug, Default)]
pub struct BookClosingPhase;

#[async_trait]
impl SagaPhase for BookClosingPhase {
    fn kind(&self) -> MigrationPhase {
        MigrationPhase::BookClosing
    }

    fn enabled(&self, options: &MigrationOptions) -> bool {
        options.enable_book_closing
    }

    async fn execute(
        &self,
        ctx: &MigrationContext,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let target = ctx.target_stream();
        let marker = Event::stream_closed(
            &StreamClosed {
                continuation_stream_id: target.stream_identifier.clone(),
                continuation_stream_type: target.stream_type.clone(),
                continuation_data_store: target.data_store.clone(),
                continuation_document_store: target.document_store.clone(),
                continuation_stream_connection_name: target.stream_connection_name.clone(),
                reason: TerminationReason::Migration,
                migration_id: ctx.migration_id,
                last_business_event_version: run.source_version,
                closed_at: Utc::now(),
            },
            run.source_version + 1,
        )?;
        ctx.source_store
            .append(ctx.source_stream(), true, vec![marker], cancel)
            .await?;
        run.book_closed = true;
        info!(version = run.source_version + 1, "Source stream closed");
        Ok(())
    }
}

/// Restores the pre-cutover document when the cutover was persisted.
#[derive(Debug, Default)]
pub struct RestoreDocument;

#[async_trait]
impl RollbackHandler for RestoreDocument {
    async fn rollback(
        &self,
        ctx: &MigrationContext,
        run: &SagaRun,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(original) = &run.original_document else {
            info!("Cutover not persisted, nothing to compensate");
            return Ok(());
        };

        let stored = ctx
            .document_store
            .get(&ctx.document.object_name, &ctx.document.object_id)
            .await?;
        let mut restored = original.clone();
        restored.hash = stored.hash;
        restored.seal();
        ctx.document_store.set(&restored).await?;

        warn!(
            active = %restored.active.stream_identifier,
            "Document restored to the source stream"
        );
        Ok(())
    }
}
