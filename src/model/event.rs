//! Event records and the stream-closed marker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type of the marker that terminates a stream.
pub const STREAM_CLOSED_EVENT_TYPE: &str = "EventStream.Closed";

/// Schema version written on close markers.
pub const STREAM_CLOSED_SCHEMA_VERSION: u32 = 1;

/// One entry of an append-only event stream.
///
/// Within a stream `event_version` starts at zero and strictly increases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. `"Order.Created"`).
    pub event_type: String,
    /// Position of the event within its stream.
    pub event_version: i64,
    /// Version of the payload schema.
    pub schema_version: u32,
    /// Event payload.
    pub payload: serde_json::Value,
    /// Free-form metadata (correlation ids, actors, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// When the event was originally written.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a business event at the given version.
    pub fn new(event_type: impl Into<String>, event_version: i64, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_version,
            schema_version: 1,
            payload,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the schema version.
    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the close marker that terminates a stream at `event_version`.
    pub fn stream_closed(closed: &StreamClosed, event_version: i64) -> serde_json::Result<Self> {
        Ok(Self {
            event_type: STREAM_CLOSED_EVENT_TYPE.to_string(),
            event_version,
            schema_version: STREAM_CLOSED_SCHEMA_VERSION,
            payload: serde_json::to_value(closed)?,
            metadata: BTreeMap::from([(
                "migration_id".to_string(),
                closed.migration_id.to_string(),
            )]),
            timestamp: closed.closed_at,
        })
    }

    /// Whether this event is a close marker.
    pub fn is_stream_closed(&self) -> bool {
        self.event_type == STREAM_CLOSED_EVENT_TYPE
    }

    /// Decode the close marker payload. `None` for business events or
    /// markers whose payload does not parse.
    pub fn stream_closed_payload(&self) -> Option<StreamClosed> {
        if !self.is_stream_closed() {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Why a stream stopped accepting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Superseded by a migration to a new stream.
    Migration,
    /// Closed by an operator or retention policy.
    Archived,
    /// Deleted along with the object.
    Deleted,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Migration => write!(f, "migration"),
            TerminationReason::Archived => write!(f, "archived"),
            TerminationReason::Deleted => write!(f, "deleted"),
        }
    }
}

/// Payload of the close marker. Redirects readers and writers to the
/// continuation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamClosed {
    pub continuation_stream_id: String,
    pub continuation_stream_type: String,
    pub continuation_data_store: String,
    pub continuation_document_store: String,
    pub continuation_stream_connection_name: String,
    pub reason: TerminationReason,
    pub migration_id: Uuid,
    /// Version of the last business event before the marker.
    pub last_business_event_version: i64,
    pub closed_at: DateTime<Utc>,
}

/// Highest `event_version` among business events, or -1 when there are none.
pub fn last_business_version(events: &[Event]) -> i64 {
    events
        .iter()
        .filter(|e| !e.is_stream_closed())
        .map(|e| e.event_version)
        .max()
        .unwrap_or(-1)
}
