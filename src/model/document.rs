//! Object documents: the per-object record of which stream is active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::event::TerminationReason;

/// Chunking configuration for streams split across storage objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSettings {
    pub enable_chunks: bool,
    pub chunk_size: u32,
}

/// One chunk of a chunked stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub chunk_identifier: u32,
    pub first_event_version: i64,
    pub last_event_version: i64,
}

/// A snapshot taken of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub until_version: i64,
    pub name: Option<String>,
}

/// Descriptor of the stream currently holding an object's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInformation {
    pub stream_identifier: String,
    pub stream_type: String,
    /// Version of the last event on the stream; -1 when empty.
    pub current_stream_version: i64,
    pub data_store: String,
    pub document_store: String,
    pub document_tag_store: String,
    pub stream_tag_store: String,
    pub snapshot_store: String,
    pub stream_connection_name: String,
    pub document_connection_name: String,
    pub snapshot_connection_name: String,
    pub chunk_settings: Option<ChunkSettings>,
    #[serde(default)]
    pub stream_chunks: Vec<StreamChunk>,
    #[serde(default)]
    pub snapshots: Vec<StreamSnapshot>,
}

impl StreamInformation {
    /// Create an empty stream descriptor using `store` for every store and
    /// `connection` for every connection name.
    pub fn new(
        stream_identifier: impl Into<String>,
        stream_type: impl Into<String>,
        store: &str,
        connection: &str,
    ) -> Self {
        Self {
            stream_identifier: stream_identifier.into(),
            stream_type: stream_type.into(),
            current_stream_version: -1,
            data_store: store.to_string(),
            document_store: store.to_string(),
            document_tag_store: store.to_string(),
            stream_tag_store: store.to_string(),
            snapshot_store: store.to_string(),
            stream_connection_name: connection.to_string(),
            document_connection_name: connection.to_string(),
            snapshot_connection_name: connection.to_string(),
            chunk_settings: None,
            stream_chunks: Vec::new(),
            snapshots: Vec::new(),
        }
    }
}

/// Record of a stream that has been superseded. Written once at cutover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedStream {
    pub stream_identifier: String,
    pub stream_type: String,
    pub reason: TerminationReason,
    pub terminated_at: DateTime<Utc>,
    pub continuation_stream_id: Option<String>,
    pub continuation_stream_type: Option<String>,
    /// Last business-event version on the terminated stream.
    pub stream_version: i64,
    pub deleted: bool,
    pub migration_id: Option<Uuid>,
}

/// Per-object root document.
///
/// `terminated_streams` is append-only and ordered by termination time.
/// `hash`/`prev_hash` form an integrity chain across persisted versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDocument {
    pub object_id: String,
    pub object_name: String,
    pub active: StreamInformation,
    #[serde(default)]
    pub terminated_streams: Vec<TerminatedStream>,
    pub schema_version: Option<String>,
    pub hash: Option<String>,
    pub prev_hash: Option<String>,
}

#[derive(Serialize)]
struct HashInput<'a> {
    object_id: &'a str,
    object_name: &'a str,
    active: &'a StreamInformation,
    terminated_streams: &'a [TerminatedStream],
    prev_hash: Option<&'a str>,
}

impl ObjectDocument {
    pub fn new(
        object_name: impl Into<String>,
        object_id: impl Into<String>,
        active: StreamInformation,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_name: object_name.into(),
            active,
            terminated_streams: Vec::new(),
            schema_version: None,
            hash: None,
            prev_hash: None,
        }
    }

    /// Hex SHA-256 over the document contents and `prev_hash`.
    pub fn compute_hash(&self) -> String {
        let input = HashInput {
            object_id: &self.object_id,
            object_name: &self.object_name,
            active: &self.active,
            terminated_streams: &self.terminated_streams,
            prev_hash: self.prev_hash.as_deref(),
        };
        // Serializing plain structs of strings and integers cannot fail.
        let bytes = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Advance the hash chain: the current hash becomes `prev_hash`.
    pub fn seal(&mut self) {
        self.prev_hash = self.hash.take();
        self.hash = Some(self.compute_hash());
    }

    /// Whether `hash` matches the document contents.
    pub fn verify_integrity(&self) -> bool {
        match &self.hash {
            Some(hash) => *hash == self.compute_hash(),
            None => false,
        }
    }

    /// The most recent terminated stream, if any.
    pub fn last_terminated(&self) -> Option<&TerminatedStream> {
        self.terminated_streams.last()
    }
}
