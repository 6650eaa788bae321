//! DocumentStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::ObjectDocument;

/// Interface for object document persistence.
///
/// Implementations:
/// - `InMemoryDocumentStore`: In-memory store for tests and embedding
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the document for an object.
    ///
    /// Fails with `StorageError::DocumentNotFound` if it does not exist.
    async fn get(&self, object_name: &str, object_id: &str) -> Result<ObjectDocument>;

    /// Store a new document. The stored copy is sealed; the sealed
    /// document is returned.
    ///
    /// Fails with `StorageError::DocumentExists` if one is already stored.
    async fn create(&self, document: ObjectDocument) -> Result<ObjectDocument>;

    /// Replace a stored document.
    ///
    /// The incoming document must already be sealed on top of the stored
    /// version: its `prev_hash` must equal the stored `hash`. Otherwise
    /// the write is rejected with `StorageError::DocumentConflict`.
    async fn set(&self, document: &ObjectDocument) -> Result<()>;
}
