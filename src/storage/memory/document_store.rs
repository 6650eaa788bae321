//! In-memory DocumentStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::ObjectDocument;
use crate::storage::{DocumentStore, Result, StorageError};

/// Key type for documents: (object_name, object_id).
type DocumentKey = (String, String);

/// Document store that keeps sealed documents in memory.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentKey, ObjectDocument>>,
    fail_on_set: RwLock<bool>,
    set_count: RwLock<u32>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_set(&self, fail: bool) {
        *self.fail_on_set.write().await = fail;
    }

    /// Number of successful `set` calls.
    pub async fn set_count(&self) -> u32 {
        *self.set_count.read().await
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, object_name: &str, object_id: &str) -> Result<ObjectDocument> {
        let key = (object_name.to_string(), object_id.to_string());
        self.documents
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::DocumentNotFound {
                object_name: object_name.to_string(),
                object_id: object_id.to_string(),
            })
    }

    async fn create(&self, mut document: ObjectDocument) -> Result<ObjectDocument> {
        let key = (document.object_name.clone(), document.object_id.clone());
        let mut documents = self.documents.write().await;
        if documents.contains_key(&key) {
            return Err(StorageError::DocumentExists {
                object_name: document.object_name,
                object_id: document.object_id,
            });
        }
        document.hash = None;
        document.seal();
        documents.insert(key, document.clone());
        Ok(document)
    }

    async fn set(&self, document: &ObjectDocument) -> Result<()> {
        if *self.fail_on_set.read().await {
            return Err(StorageError::Backend("set failure injected".to_string()));
        }
        let key = (document.object_name.clone(), document.object_id.clone());
        let mut documents = self.documents.write().await;
        let stored = documents
            .get(&key)
            .ok_or_else(|| StorageError::DocumentNotFound {
                object_name: document.object_name.clone(),
                object_id: document.object_id.clone(),
            })?;
        if stored.hash != document.prev_hash || !document.verify_integrity() {
            return Err(StorageError::DocumentConflict {
                object_name: document.object_name.clone(),
                object_id: document.object_id.clone(),
            });
        }
        documents.insert(key, document.clone());
        *self.set_count.write().await += 1;
        Ok(())
    }
}
