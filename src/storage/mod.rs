//! Storage abstractions for event streams and object documents.
//!
//! Concrete backends live outside this crate. The in-memory backends in
//! [`memory`] implement the full contracts and back the test suites.

use tokio_util::sync::CancellationToken;

use crate::model::{Event, StreamInformation};

mod document_store;
mod event_store;
pub mod memory;

pub use document_store::DocumentStore;
pub use event_store::EventStore;
pub use memory::{InMemoryDocumentStore, InMemoryEventStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Callers branch on the variant; the message text is for humans only.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Stream not found: {stream}")]
    StreamNotFound { stream: String },

    #[error("Document not found: {object_name}/{object_id}")]
    DocumentNotFound {
        object_name: String,
        object_id: String,
    },

    #[error("Version conflict on stream {stream}: expected {expected}, actual {actual}")]
    VersionConflict {
        stream: String,
        expected: i64,
        actual: i64,
    },

    #[error("Stream {stream} is closed; writes continue on {continuation}")]
    StreamClosed {
        stream: String,
        continuation: String,
    },

    #[error("Document {object_name}/{object_id} was modified concurrently")]
    DocumentConflict {
        object_name: String,
        object_id: String,
    },

    #[error("Document already exists: {object_name}/{object_id}")]
    DocumentExists {
        object_name: String,
        object_id: String,
    },

    #[error("Storage operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Stream or document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::StreamNotFound { .. } | StorageError::DocumentNotFound { .. }
        )
    }

    /// Optimistic-concurrency failure on a stream or document.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::VersionConflict { .. } | StorageError::DocumentConflict { .. }
        )
    }

    /// The stream was sealed by a close marker.
    pub fn is_closed(&self) -> bool {
        matches!(self, StorageError::StreamClosed { .. })
    }

    /// The store's actual stream version carried by a version conflict.
    pub fn actual_version(&self) -> Option<i64> {
        match self {
            StorageError::VersionConflict { actual, .. } => Some(*actual),
            _ => None,
        }
    }
}

/// Read every event of a stream, treating a missing stream as empty.
pub async fn read_all_or_empty(
    store: &dyn EventStore,
    stream: &StreamInformation,
    cancel: &CancellationToken,
) -> Result<Vec<Event>> {
    match store.read(stream, 0, None, None, cancel).await {
        Ok(events) => Ok(events),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
