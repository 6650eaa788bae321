//! EventStore trait definition.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Result;
use crate::model::{Event, StreamInformation};

/// Interface for event persistence.
///
/// Streams are addressed by their [`StreamInformation`]; backends pick the
/// stream identifier, store names and connection names they need from it.
///
/// Implementations:
/// - `InMemoryEventStore`: In-memory store for tests and embedding
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Read events with `start_version <= event_version <= until_version`,
    /// ordered by version. `until_version = None` reads to the end.
    ///
    /// `chunk` restricts the read to one chunk of a chunked stream.
    /// Fails with `StorageError::StreamNotFound` when the stream does not exist.
    async fn read(
        &self,
        stream: &StreamInformation,
        start_version: i64,
        until_version: Option<i64>,
        chunk: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>>;

    /// Append events to a stream, creating it if necessary.
    ///
    /// Every appended `event_version` must be strictly greater than the
    /// stream's current version and than the previous event in the batch.
    /// Otherwise nothing is written and `StorageError::VersionConflict`
    /// reports the actual current version.
    ///
    /// A stream holding a close marker is sealed: every further append fails
    /// with `StorageError::StreamClosed` naming the continuation stream.
    ///
    /// When `preserve_timestamp` is false the store stamps events with the
    /// time of the append.
    async fn append(
        &self,
        stream: &StreamInformation,
        preserve_timestamp: bool,
        events: Vec<Event>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
