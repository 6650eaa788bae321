//! In-memory EventStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::model::{Event, StreamInformation};
use crate::storage::{EventStore, Result, StorageError};

/// Event store that keeps streams in memory, keyed by stream identifier.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<String, Vec<Event>>>,
    fail_on_append: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Write events directly, bypassing version checks.
    pub async fn seed(&self, stream_id: &str, events: Vec<Event>) {
        self.streams
            .write()
            .await
            .entry(stream_id.to_string())
            .or_default()
            .extend(events);
    }

    /// Snapshot of a stream's events. Empty if the stream does not exist.
    pub async fn events(&self, stream_id: &str) -> Vec<Event> {
        self.streams
            .read()
            .await
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a stream has been created.
    pub async fn contains(&self, stream_id: &str) -> bool {
        self.streams.read().await.contains_key(stream_id)
    }
}

fn in_chunk(stream: &StreamInformation, chunk: Option<u32>, version: i64) -> bool {
    let (Some(chunk), Some(settings)) = (chunk, stream.chunk_settings.as_ref()) else {
        return true;
    };
    if !settings.enable_chunks || settings.chunk_size == 0 {
        return true;
    }
    let size = i64::from(settings.chunk_size);
    let first = i64::from(chunk) * size;
    version >= first && version < first + size
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn read(
        &self,
        stream: &StreamInformation,
        start_version: i64,
        until_version: Option<i64>,
        chunk: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if *self.fail_on_read.read().await {
            return Err(StorageError::Backend("read failure injected".to_string()));
        }
        let streams = self.streams.read().await;
        let events = streams
            .get(&stream.stream_identifier)
            .ok_or_else(|| StorageError::StreamNotFound {
                stream: stream.stream_identifier.clone(),
            })?;
        let mut selected: Vec<Event> = events
            .iter()
            .filter(|e| e.event_version >= start_version)
            .filter(|e| until_version.map_or(true, |until| e.event_version <= until))
            .filter(|e| in_chunk(stream, chunk, e.event_version))
            .cloned()
            .collect();
        selected.sort_by_key(|e| e.event_version);
        Ok(selected)
    }

    async fn append(
        &self,
        stream: &StreamInformation,
        preserve_timestamp: bool,
        events: Vec<Event>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if *self.fail_on_append.read().await {
            return Err(StorageError::Backend("append failure injected".to_string()));
        }
        let mut streams = self.streams.write().await;
        let existing = streams
            .entry(stream.stream_identifier.clone())
            .or_default();
        if let Some(marker) = existing.iter().find(|e| e.is_stream_closed()) {
            let continuation = marker
                .stream_closed_payload()
                .map(|closed| closed.continuation_stream_id)
                .unwrap_or_default();
            return Err(StorageError::StreamClosed {
                stream: stream.stream_identifier.clone(),
                continuation,
            });
        }
        let actual = existing.iter().map(|e| e.event_version).max().unwrap_or(-1);

        let mut previous = actual;
        for event in &events {
            if event.event_version <= previous {
                return Err(StorageError::VersionConflict {
                    stream: stream.stream_identifier.clone(),
                    expected: event.event_version - 1,
                    actual,
                });
            }
            previous = event.event_version;
        }

        let now = Utc::now();
        existing.extend(events.into_iter().map(|mut event| {
            if !preserve_timestamp {
                event.timestamp = now;
            }
            event
        }));
        Ok(())
    }
}
