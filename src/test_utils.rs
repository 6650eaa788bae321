//! Test fixtures and store wrappers.
//!
//! Builds seeded in-memory stores and documents, and wraps an event store
//! so tests can simulate writers racing a migration.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{Event, ObjectDocument, StreamInformation};
use crate::storage::{
    DocumentStore, EventStore, InMemoryDocumentStore, InMemoryEventStore, Result,
};

pub const OBJECT_NAME: &str = "order";
pub const OBJECT_ID: &str = "1";
pub const SOURCE_STREAM: &str = "order-1";

/// Stream descriptor with every store named `events`.
pub fn stream(id: &str) -> StreamInformation {
    StreamInformation::new(id, "blob", "events", "primary")
}

/// Business events with the given versions.
pub fn business_events(versions: impl IntoIterator<Item = i64>) -> Vec<Event> {
    versions
        .into_iter()
        .map(|v| Event::new("Order.Updated", v, json!({ "seq": v })))
        .collect()
}

/// Versions of `events`, in order.
pub fn versions(events: &[Event]) -> Vec<i64> {
    events.iter().map(|e| e.event_version).collect()
}

/// Seeded stores plus the document pointing at the source stream.
pub struct Fixture {
    pub source_store: Arc<InMemoryEventStore>,
    pub target_store: Arc<InMemoryEventStore>,
    pub document_store: Arc<InMemoryDocumentStore>,
    pub document: ObjectDocument,
}

impl Fixture {
    /// Source stream `order-1` seeded with `source_versions`; the stored
    /// document's active stream is the source.
    pub async fn new(source_versions: impl IntoIterator<Item = i64>) -> Self {
        let source_store = Arc::new(InMemoryEventStore::new());
        let events = business_events(source_versions);
        let mut active = stream(SOURCE_STREAM);
        active.current_stream_version = events.last().map_or(-1, |e| e.event_version);
        source_store.seed(SOURCE_STREAM, events).await;

        let document_store = Arc::new(InMemoryDocumentStore::new());
        let document = match document_store
            .create(ObjectDocument::new(OBJECT_NAME, OBJECT_ID, active.clone()))
            .await
        {
            Ok(document) => document,
            Err(e) => panic!("fixture document: {}", e),
        };

        Self {
            source_store,
            target_store: Arc::new(InMemoryEventStore::new()),
            document_store,
            document,
        }
    }

    /// Fixture where source and target live in the same store.
    pub async fn shared_store(source_versions: impl IntoIterator<Item = i64>) -> Self {
        let mut fixture = Self::new(source_versions).await;
        fixture.target_store = fixture.source_store.clone();
        fixture
    }

    pub async fn stored_document(&self) -> ObjectDocument {
        match self.document_store.get(OBJECT_NAME, OBJECT_ID).await {
            Ok(document) => document,
            Err(e) => panic!("stored document: {}", e),
        }
    }
}

/// When an intercepting store injects its writes relative to the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTiming {
    /// The read observes the injected events.
    BeforeRead,
    /// The injected events land just after the read's snapshot.
    AfterRead,
}

type ReadHook = dyn Fn(u32, i64) -> Vec<Event> + Send + Sync;

/// Wraps an [`InMemoryEventStore`] and injects events into one stream
/// whenever that stream is read.
///
/// The hook receives the 1-based read count and the stream's current last
/// version (close marker included) and returns events for a competing
/// writer to append. Those appends go through the regular store contract,
/// so writes the store refuses are counted instead of landing.
pub struct InterceptingEventStore {
    inner: Arc<InMemoryEventStore>,
    stream_id: String,
    timing: WriteTiming,
    reads: AtomicU32,
    rejected: AtomicU32,
    hook: Box<ReadHook>,
}

impl InterceptingEventStore {
    pub fn new<F>(
        inner: Arc<InMemoryEventStore>,
        stream_id: &str,
        timing: WriteTiming,
        hook: F,
    ) -> Self
    where
        F: Fn(u32, i64) -> Vec<Event> + Send + Sync + 'static,
    {
        Self {
            inner,
            stream_id: stream_id.to_string(),
            timing,
            reads: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            hook: Box::new(hook),
        }
    }

    /// Number of reads of the intercepted stream so far.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of injected writes the store refused.
    pub fn rejected_writes(&self) -> u32 {
        self.rejected.load(Ordering::SeqCst)
    }

    async fn inject(&self, stream: &StreamInformation, read: u32) {
        let current = self.inner.events(&self.stream_id).await;
        let last = current.iter().map(|e| e.event_version).max().unwrap_or(-1);
        let events = (self.hook)(read, last);
        if events.is_empty() {
            return;
        }
        if let Err(e) = self
            .inner
            .append(stream, false, events, &CancellationToken::new())
            .await
        {
            debug!(error = %e, read, "Injected write rejected");
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl EventStore for InterceptingEventStore {
    async fn read(
        &self,
        stream: &StreamInformation,
        start_version: i64,
        until_version: Option<i64>,
        chunk: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>> {
        if stream.stream_identifier != self.stream_id {
            return self
                .inner
                .read(stream, start_version, until_version, chunk, cancel)
                .await;
        }

        let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.timing == WriteTiming::BeforeRead {
            self.inject(stream, read).await;
        }
        let events = self
            .inner
            .read(stream, start_version, until_version, chunk, cancel)
            .await;
        if self.timing == WriteTiming::AfterRead {
            self.inject(stream, read).await;
        }
        events
    }

    async fn append(
        &self,
        stream: &StreamInformation,
        preserve_timestamp: bool,
        events: Vec<Event>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.inner
            .append(stream, preserve_timestamp, events, cancel)
            .await
    }
}
