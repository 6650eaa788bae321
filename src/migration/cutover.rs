//! Active-stream swap shared by both executors.
//!
//! Persisting the updated document is the single moment an object switches
//! streams. Everything an executor does before it can be re-run safely.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::context::StreamTarget;
use crate::model::{ObjectDocument, TerminatedStream, TerminationReason};
use crate::storage::{DocumentStore, Result};

/// Parameters for one cutover.
#[derive(Debug, Clone)]
pub struct CutoverRequest<'a> {
    pub target: &'a StreamTarget,
    /// Last business-event version on the outgoing stream.
    pub source_version: i64,
    /// Last event version on the continuation stream.
    pub target_version: i64,
    pub reason: TerminationReason,
    pub migration_id: Uuid,
}

/// Point `document` at the target stream and persist it.
///
/// The outgoing stream is recorded in `terminated_streams` and the hash
/// chain is advanced, so the write fails with a document conflict if the
/// stored document changed since `document` was loaded.
pub async fn perform_cutover(
    document_store: &dyn DocumentStore,
    document: &ObjectDocument,
    request: CutoverRequest<'_>,
) -> Result<ObjectDocument> {
    let mut updated = document.clone();
    let outgoing = &document.active;
    let new_active = request
        .target
        .stream_information(outgoing, request.target_version);

    updated.terminated_streams.push(TerminatedStream {
        stream_identifier: outgoing.stream_identifier.clone(),
        stream_type: outgoing.stream_type.clone(),
        reason: request.reason,
        terminated_at: Utc::now(),
        continuation_stream_id: Some(new_active.stream_identifier.clone()),
        continuation_stream_type: Some(new_active.stream_type.clone()),
        stream_version: request.source_version,
        deleted: false,
        migration_id: Some(request.migration_id),
    });
    updated.active = new_active;
    updated.seal();

    document_store.set(&updated).await?;

    info!(
        migration_id = %request.migration_id,
        object_id = %updated.object_id,
        from = %outgoing.stream_identifier,
        to = %updated.active.stream_identifier,
        version = request.target_version,
        "Cutover persisted"
    );

    Ok(updated)
}
