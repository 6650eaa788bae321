use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::migration::context::{before_append_hook, LiveMigrationOptions, StreamTarget};
use crate::migration::cutover::{perform_cutover, CutoverRequest};
use crate::migration::result::LiveFailureKind;
use crate::model::{StreamClosed, TerminationReason};
use crate::storage::{EventStore, InMemoryEventStore};
use crate::test_utils::{
    business_events, stream, versions, Fixture, InterceptingEventStore, WriteTiming,
    SOURCE_STREAM,
};
use crate::transform::{EventTransformer, FnTransformer, TransformError};

const TARGET_STREAM: &str = "order-1-v2";

fn context(fixture: &Fixture) -> LiveMigrationContext {
    LiveMigrationContext::new(
        fixture.document.clone(),
        StreamTarget::new(TARGET_STREAM),
        fixture.source_store.clone(),
        fixture.target_store.clone(),
        fixture.document_store.clone(),
    )
}

fn fast_options() -> LiveMigrationOptions {
    LiveMigrationOptions {
        catch_up_delay: Duration::from_millis(10),
        ..LiveMigrationOptions::default()
    }
}

/// Writer that appends one event after every read of the source, so the
/// target never catches up.
fn always_ahead(fixture: &Fixture) -> Arc<InterceptingEventStore> {
    Arc::new(InterceptingEventStore::new(
        fixture.source_store.clone(),
        SOURCE_STREAM,
        WriteTiming::AfterRead,
        |_, last| business_events([last + 1]),
    ))
}

fn marker(events: &[Event]) -> StreamClosed {
    let closed = events.iter().find(|e| e.is_stream_closed()).unwrap();
    closed.stream_closed_payload().unwrap()
}

#[tokio::test]
async fn test_migrates_five_events() {
    let fixture = Fixture::new(0..=4).await;
    let ctx = context(&fixture);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert_eq!(result.close_outcome(), Some(&CloseOutcome::PerformedCutover));
    assert_eq!(result.total_events_copied, 5);
    assert_eq!(result.events_skipped, 0);
    assert_eq!(result.source_version, 4);
    assert_eq!(result.target_version, 4);

    let target = fixture.target_store.events(TARGET_STREAM).await;
    assert_eq!(versions(&target), vec![0, 1, 2, 3, 4]);
    assert!(target.iter().all(|e| !e.is_stream_closed()));

    let source = fixture.source_store.events(SOURCE_STREAM).await;
    assert_eq!(versions(&source), vec![0, 1, 2, 3, 4, 5]);
    assert!(source[5].is_stream_closed());
    let closed = marker(&source);
    assert_eq!(closed.continuation_stream_id, TARGET_STREAM);
    assert_eq!(closed.last_business_event_version, 4);
    assert_eq!(closed.migration_id, ctx.migration_id);
    assert_eq!(closed.reason, TerminationReason::Migration);

    let document = fixture.stored_document().await;
    assert_eq!(document.active.stream_identifier, TARGET_STREAM);
    assert_eq!(document.active.current_stream_version, 4);
    assert_eq!(document.terminated_streams.len(), 1);
    assert_eq!(document.terminated_streams[0].stream_identifier, SOURCE_STREAM);
    assert_eq!(document.terminated_streams[0].stream_version, 4);
    assert!(document.verify_integrity());
    assert_eq!(result.document.as_ref(), Some(&document));
}

#[tokio::test]
async fn test_empty_source_migrates() {
    let fixture = Fixture::new(std::iter::empty()).await;
    let result = LiveMigrationExecutor::new()
        .execute(&context(&fixture), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    let source = fixture.source_store.events(SOURCE_STREAM).await;
    assert_eq!(versions(&source), vec![0]);
    assert_eq!(marker(&source).last_business_event_version, -1);
    assert_eq!(
        fixture.stored_document().await.active.current_stream_version,
        -1
    );
}

#[tokio::test]
async fn test_drift_before_close_is_caught_up() {
    let fixture = Fixture::new(0..=2).await;
    // Third source read is the close verification.
    let source = Arc::new(InterceptingEventStore::new(
        fixture.source_store.clone(),
        SOURCE_STREAM,
        WriteTiming::BeforeRead,
        |read, _| {
            if read == 3 {
                business_events(3..=4)
            } else {
                Vec::new()
            }
        },
    ));
    let mut ctx = context(&fixture);
    ctx.source_store = source.clone();
    ctx.options = fast_options();

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert!(result.iterations >= 2);
    assert_eq!(result.total_events_copied, 5);

    let target = fixture.target_store.events(TARGET_STREAM).await;
    assert_eq!(versions(&target), vec![0, 1, 2, 3, 4]);
    let source_events = fixture.source_store.events(SOURCE_STREAM).await;
    assert_eq!(versions(&source_events), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(marker(&source_events).last_business_event_version, 4);
}

#[tokio::test]
async fn test_marker_conflict_is_retried() {
    let fixture = Fixture::new(0..=2).await;
    // v3 lands right after the close verification read, so the marker
    // append at v3 conflicts.
    let source = Arc::new(InterceptingEventStore::new(
        fixture.source_store.clone(),
        SOURCE_STREAM,
        WriteTiming::AfterRead,
        |read, _| {
            if read == 3 {
                business_events([3])
            } else {
                Vec::new()
            }
        },
    ));
    let mut ctx = context(&fixture);
    ctx.source_store = source;
    ctx.options = fast_options();

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    let target = fixture.target_store.events(TARGET_STREAM).await;
    assert_eq!(versions(&target), vec![0, 1, 2, 3]);
    let source_events = fixture.source_store.events(SOURCE_STREAM).await;
    assert_eq!(versions(&source_events), vec![0, 1, 2, 3, 4]);
    assert!(source_events[4].is_stream_closed());
    assert_eq!(source_events.iter().filter(|e| e.is_stream_closed()).count(), 1);
}

#[tokio::test]
async fn test_rerun_after_completion_copies_nothing() {
    let fixture = Fixture::new(0..=4).await;
    let ctx = context(&fixture);
    let executor = LiveMigrationExecutor::new();
    assert!(executor.execute(&ctx, &CancellationToken::new()).await.is_success());

    let rerun = executor.execute(&ctx, &CancellationToken::new()).await;

    assert!(rerun.is_success());
    assert_eq!(
        rerun.close_outcome(),
        Some(&CloseOutcome::AlreadyClosed {
            continuation_stream_id: TARGET_STREAM.to_string()
        })
    );
    assert_eq!(rerun.total_events_copied, 0);
    assert!(rerun.document.is_none());
    assert_eq!(
        versions(&fixture.target_store.events(TARGET_STREAM).await),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(fixture.stored_document().await.terminated_streams.len(), 1);
}

#[tokio::test]
async fn test_closed_toward_other_target_is_left_alone() {
    let fixture = Fixture::new(0..=4).await;
    assert!(LiveMigrationExecutor::new()
        .execute(&context(&fixture), &CancellationToken::new())
        .await
        .is_success());

    let mut ctx = context(&fixture);
    ctx.target = StreamTarget::new("order-1-v3");
    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert_eq!(
        result.close_outcome(),
        Some(&CloseOutcome::AlreadyClosed {
            continuation_stream_id: TARGET_STREAM.to_string()
        })
    );
    assert!(!fixture.target_store.contains("order-1-v3").await);
}

#[tokio::test]
async fn test_resumes_interrupted_cutover() {
    let fixture = Fixture::new(0..=4).await;
    let ctx = context(&fixture);
    let target = ctx.target_stream();
    let cancel = CancellationToken::new();

    // An earlier attempt copied v0..v2, a writer added v3 and v4, and the
    // source was closed after v4 before that attempt could cut over.
    fixture
        .target_store
        .append(&target, true, business_events(0..=2), &cancel)
        .await
        .unwrap();
    let closed = Event::stream_closed(
        &StreamClosed {
            continuation_stream_id: TARGET_STREAM.to_string(),
            continuation_stream_type: target.stream_type.clone(),
            continuation_data_store: target.data_store.clone(),
            continuation_document_store: target.document_store.clone(),
            continuation_stream_connection_name: target.stream_connection_name.clone(),
            reason: TerminationReason::Migration,
            migration_id: uuid::Uuid::new_v4(),
            last_business_event_version: 4,
            closed_at: chrono::Utc::now(),
        },
        5,
    )
    .unwrap();
    fixture.source_store.seed(SOURCE_STREAM, vec![closed]).await;

    let result = LiveMigrationExecutor::new().execute(&ctx, &cancel).await;

    assert_eq!(result.close_outcome(), Some(&CloseOutcome::ResumedCutover));
    assert_eq!(result.total_events_copied, 2);
    assert_eq!(
        versions(&fixture.target_store.events(TARGET_STREAM).await),
        vec![0, 1, 2, 3, 4]
    );
    let document = fixture.stored_document().await;
    assert_eq!(document.active.stream_identifier, TARGET_STREAM);
    assert_eq!(document.active.current_stream_version, 4);
    assert_eq!(document.terminated_streams[0].stream_version, 4);
}

#[tokio::test]
async fn test_write_after_close_is_refused_and_nothing_slips() {
    let fixture = Fixture::new(0..=4).await;
    // A writer tries to append right after the marker lands, as the
    // post-close copy reads the source.
    let source = Arc::new(InterceptingEventStore::new(
        fixture.source_store.clone(),
        SOURCE_STREAM,
        WriteTiming::BeforeRead,
        |read, last| {
            if read == 4 {
                business_events([last + 1])
            } else {
                Vec::new()
            }
        },
    ));
    let mut ctx = context(&fixture);
    ctx.source_store = source.clone();

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert_eq!(result.close_outcome(), Some(&CloseOutcome::PerformedCutover));
    assert_eq!(source.reads(), 4);
    assert_eq!(source.rejected_writes(), 1);
    assert_eq!(result.total_events_copied, 5);

    let source_events = fixture.source_store.events(SOURCE_STREAM).await;
    assert_eq!(versions(&source_events), vec![0, 1, 2, 3, 4, 5]);
    assert!(source_events[5].is_stream_closed());
    assert_eq!(marker(&source_events).last_business_event_version, 4);
    assert_eq!(
        versions(&fixture.target_store.events(TARGET_STREAM).await),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(fixture.stored_document().await.active.current_stream_version, 4);
}

#[tokio::test]
async fn test_redirected_document_stops_without_closing() {
    let fixture = Fixture::new(0..=2).await;
    let other = StreamTarget::new("order-1-other");
    perform_cutover(
        fixture.document_store.as_ref(),
        &fixture.document,
        CutoverRequest {
            target: &other,
            source_version: 2,
            target_version: 2,
            reason: TerminationReason::Migration,
            migration_id: uuid::Uuid::new_v4(),
        },
    )
    .await
    .unwrap();

    let result = LiveMigrationExecutor::new()
        .execute(&context(&fixture), &CancellationToken::new())
        .await;

    assert_eq!(
        result.close_outcome(),
        Some(&CloseOutcome::RedirectedElsewhere {
            active_stream_id: "order-1-other".to_string()
        })
    );
    let source = fixture.source_store.events(SOURCE_STREAM).await;
    assert!(source.iter().all(|e| !e.is_stream_closed()));
}

#[tokio::test]
async fn test_failed_transform_skips_event() {
    let fixture = Fixture::new(0..=4).await;
    let transformer: Arc<dyn EventTransformer> = Arc::new(FnTransformer::new(|event: Event| {
        if event.event_version == 2 {
            Err(TransformError::Failed("bad payload".to_string()))
        } else {
            Ok(event)
        }
    }));
    let ctx = context(&fixture).with_transformer(transformer);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert_eq!(result.total_events_copied, 4);
    assert_eq!(result.events_skipped, 1);
    assert_eq!(
        versions(&fixture.target_store.events(TARGET_STREAM).await),
        vec![0, 1, 3, 4]
    );
    let source = fixture.source_store.events(SOURCE_STREAM).await;
    assert_eq!(source[2].event_version, 2);
    assert_eq!(marker(&source).last_business_event_version, 4);
}

#[tokio::test]
async fn test_transformed_events_are_reported() {
    let fixture = Fixture::new(0..=2).await;
    let transformer: Arc<dyn EventTransformer> = Arc::new(FnTransformer::new(|mut event: Event| {
        // Version changes are ignored; the source version is kept.
        event.event_version += 100;
        Ok(event.with_schema_version(2))
    }));
    let copied = Arc::new(Mutex::new(Vec::new()));
    let sink = copied.clone();
    let options = LiveMigrationOptions {
        on_event_copied: Some(Arc::new(move |p: &EventCopyProgress| {
            sink.lock().unwrap().push(p.clone())
        })),
        ..LiveMigrationOptions::default()
    };
    let ctx = context(&fixture)
        .with_transformer(transformer)
        .with_options(options);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success());
    let target = fixture.target_store.events(TARGET_STREAM).await;
    assert_eq!(versions(&target), vec![0, 1, 2]);
    assert!(target.iter().all(|e| e.schema_version == 2));

    let copied = copied.lock().unwrap();
    assert_eq!(copied.len(), 3);
    assert!(copied.iter().all(EventCopyProgress::was_transformed));
    assert_eq!(copied[2].total_events_copied, 3);
    let summary = copied[0].transformation.as_ref().unwrap();
    assert_eq!(summary.original_schema_version, 1);
    assert_eq!(summary.schema_version, 2);
}

#[tokio::test]
async fn test_iteration_progress_is_reported() {
    let fixture = Fixture::new(0..=4).await;
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let options = LiveMigrationOptions {
        on_progress: Some(Arc::new(move |p: &LiveMigrationProgress| {
            sink.lock().unwrap().push(p.clone())
        })),
        ..LiveMigrationOptions::default()
    };
    let ctx = context(&fixture).with_options(options);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success());
    let progress = progress.lock().unwrap();
    assert_eq!(progress.len() as u32, result.iterations);
    let first = &progress[0];
    assert_eq!(first.iteration, 1);
    assert_eq!(first.events_copied_this_iteration, 5);
    assert_eq!(first.total_events_copied, 5);
    assert_eq!(first.source_version, 4);
    assert_eq!(first.target_version, 4);
    assert!(first.is_synced);
}

#[tokio::test]
async fn test_progress_is_reported_when_source_already_closed() {
    let fixture = Fixture::new(0..=4).await;
    let executor = LiveMigrationExecutor::new();
    assert!(executor
        .execute(&context(&fixture), &CancellationToken::new())
        .await
        .is_success());

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let options = LiveMigrationOptions {
        on_progress: Some(Arc::new(move |p: &LiveMigrationProgress| {
            sink.lock().unwrap().push(p.clone())
        })),
        ..LiveMigrationOptions::default()
    };
    let rerun = executor
        .execute(
            &context(&fixture).with_options(options),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        rerun.close_outcome(),
        Some(CloseOutcome::AlreadyClosed { .. })
    ));
    assert_eq!(rerun.iterations, 1);
    let progress = progress.lock().unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].iteration, 1);
    assert_eq!(progress[0].source_version, 4);
    assert_eq!(progress[0].events_copied_this_iteration, 0);
    assert!(progress[0].is_synced);
}

#[tokio::test]
async fn test_hook_runs_before_each_append() {
    let fixture = Fixture::new(0..=3).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let target_store = fixture.target_store.clone();
    let options = LiveMigrationOptions {
        before_append: Some(before_append_hook(move |event: Event| {
            let sink = sink.clone();
            let target_store = target_store.clone();
            async move {
                // The event is not yet durable when the hook runs.
                let on_target = target_store.events(TARGET_STREAM).await;
                sink.lock().unwrap().push((event.event_version, on_target.len()));
                Ok(())
            }
        })),
        ..LiveMigrationOptions::default()
    };
    let ctx = context(&fixture).with_options(options);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(0, 0), (1, 1), (2, 2), (3, 3)]
    );
}

#[tokio::test]
async fn test_hook_failure_aborts() {
    let fixture = Fixture::new(0..=3).await;
    let options = LiveMigrationOptions {
        before_append: Some(before_append_hook(|event: Event| async move {
            if event.event_version == 2 {
                Err("downstream unavailable".into())
            } else {
                Ok(())
            }
        })),
        ..LiveMigrationOptions::default()
    };
    let ctx = context(&fixture).with_options(options);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert_eq!(result.failure_kind(), Some(LiveFailureKind::Unexpected));
    assert!(matches!(
        result.error(),
        Some(MigrationError::Hook { event_version: 2, .. })
    ));
    assert_eq!(
        versions(&fixture.target_store.events(TARGET_STREAM).await),
        vec![0, 1]
    );
    let source = fixture.source_store.events(SOURCE_STREAM).await;
    assert!(source.iter().all(|e| !e.is_stream_closed()));
}

#[tokio::test(start_paused = true)]
async fn test_iteration_limit_fails() {
    let fixture = Fixture::new(0..=2).await;
    let mut ctx = context(&fixture);
    ctx.source_store = always_ahead(&fixture);
    ctx.options = LiveMigrationOptions {
        max_iterations: 3,
        ..fast_options()
    };

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert_eq!(
        result.failure_kind(),
        Some(LiveFailureKind::IterationLimitExceeded)
    );
    assert_eq!(result.iterations, 3);
    assert!(result.error().is_none());
    let source = fixture.source_store.events(SOURCE_STREAM).await;
    assert!(source.iter().all(|e| !e.is_stream_closed()));
    assert_eq!(
        fixture.stored_document().await.active.stream_identifier,
        SOURCE_STREAM
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_timeout_fails() {
    let fixture = Fixture::new(0..=2).await;
    let mut ctx = context(&fixture);
    ctx.source_store = always_ahead(&fixture);
    ctx.options = LiveMigrationOptions {
        close_timeout: Duration::from_secs(1),
        catch_up_delay: Duration::from_millis(100),
        max_iterations: 0,
        ..LiveMigrationOptions::default()
    };

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert_eq!(result.failure_kind(), Some(LiveFailureKind::TimedOut));
    assert!(result.elapsed >= Duration::from_secs(1));
    assert!(result.iterations >= 10);
    assert!(result.total_events_copied > 3);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fixture = Fixture::new(0..=2).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = LiveMigrationExecutor::new()
        .execute(&context(&fixture), &cancel)
        .await;

    assert_eq!(result.failure_kind(), Some(LiveFailureKind::Cancelled));
    assert!(!fixture.target_store.contains(TARGET_STREAM).await);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_mid_loop() {
    let fixture = Fixture::new(0..=2).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let source = Arc::new(InterceptingEventStore::new(
        fixture.source_store.clone(),
        SOURCE_STREAM,
        WriteTiming::AfterRead,
        move |read, last| {
            if read == 4 {
                trigger.cancel();
            }
            business_events([last + 1])
        },
    ));
    let mut ctx = context(&fixture);
    ctx.source_store = source;
    ctx.options = LiveMigrationOptions {
        max_iterations: 0,
        ..fast_options()
    };

    let result = LiveMigrationExecutor::new().execute(&ctx, &cancel).await;

    assert_eq!(result.failure_kind(), Some(LiveFailureKind::Cancelled));
    assert!(result.error().map_or(false, MigrationError::is_cancellation));
}

#[tokio::test]
async fn test_target_conflict_is_retried() {
    let fixture = Fixture::new(0..=4).await;
    // A racing copier writes v0 to the target right after our first read.
    let target = Arc::new(InterceptingEventStore::new(
        fixture.target_store.clone(),
        TARGET_STREAM,
        WriteTiming::AfterRead,
        |read, _| {
            if read == 1 {
                business_events([0])
            } else {
                Vec::new()
            }
        },
    ));
    let mut ctx = context(&fixture);
    ctx.target_store = target;
    ctx.options = fast_options();

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert!(result.iterations >= 2);
    assert_eq!(result.total_events_copied, 4);
    assert_eq!(
        versions(&fixture.target_store.events(TARGET_STREAM).await),
        vec![0, 1, 2, 3, 4]
    );
}

#[tokio::test]
async fn test_same_store_migration() {
    let fixture = Fixture::shared_store(0..=4).await;
    let result = LiveMigrationExecutor::new()
        .execute(&context(&fixture), &CancellationToken::new())
        .await;

    assert!(result.is_success());
    assert_eq!(
        versions(&fixture.source_store.events(TARGET_STREAM).await),
        vec![0, 1, 2, 3, 4]
    );
}

#[tokio::test]
async fn test_invalid_context_fails() {
    let fixture = Fixture::new(0..=2).await;
    let mut ctx = context(&fixture);
    ctx.target = StreamTarget::new(SOURCE_STREAM);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert_eq!(result.failure_kind(), Some(LiveFailureKind::InvalidContext));
    assert_eq!(result.iterations, 0);
}

#[tokio::test]
async fn test_storage_failure_surfaces() {
    let fixture = Fixture::new(0..=2).await;
    fixture.source_store.set_fail_on_read(true).await;

    let result = LiveMigrationExecutor::new()
        .execute(&context(&fixture), &CancellationToken::new())
        .await;

    assert_eq!(result.failure_kind(), Some(LiveFailureKind::Storage));
    assert!(result.error_message().unwrap().contains("read failure injected"));
}

#[tokio::test]
async fn test_target_overrides_land_on_document() {
    let fixture = Fixture::new(0..=1).await;
    let mut ctx = context(&fixture);
    ctx.target = StreamTarget::new(TARGET_STREAM)
        .with_data_store("archive")
        .with_stream_type("table");

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success());
    let document = fixture.stored_document().await;
    assert_eq!(document.active.data_store, "archive");
    assert_eq!(document.active.stream_type, "table");
    assert_eq!(document.active.document_store, "events");
    let closed = marker(&fixture.source_store.events(SOURCE_STREAM).await);
    assert_eq!(closed.continuation_data_store, "archive");
    assert_eq!(closed.continuation_stream_type, "table");
}

#[tokio::test]
async fn test_missing_source_stream_is_empty() {
    let fixture = Fixture::new(std::iter::empty()).await;
    let store = Arc::new(InMemoryEventStore::new());
    let mut ctx = context(&fixture);
    ctx.source_store = store.clone();
    ctx.source_stream = stream(SOURCE_STREAM);

    let result = LiveMigrationExecutor::new()
        .execute(&ctx, &CancellationToken::new())
        .await;

    assert!(result.is_success(), "{:?}", result.error_message());
    assert_eq!(result.total_events_copied, 0);
    assert!(store.events(SOURCE_STREAM).await[0].is_stream_closed());
}
