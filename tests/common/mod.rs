//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use stream_migration::storage::{InMemoryDocumentStore, InMemoryEventStore};
use stream_migration::{
    DocumentStore, Event, LiveMigrationContext, MigrationContext, ObjectDocument,
    StreamInformation, StreamTarget,
};

pub const OBJECT_NAME: &str = "account";
pub const OBJECT_ID: &str = "acc-7";
pub const SOURCE_STREAM: &str = "account-acc-7";

pub fn deposit(version: i64) -> Event {
    Event::new(
        "Account.Deposited",
        version,
        json!({ "amount": 10 * (version + 1) }),
    )
}

pub fn versions(events: &[Event]) -> Vec<i64> {
    events.iter().map(|e| e.event_version).collect()
}

pub fn business(events: &[Event]) -> Vec<Event> {
    events
        .iter()
        .filter(|e| !e.is_stream_closed())
        .cloned()
        .collect()
}

/// One event store holding every stream, plus the document store.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<InMemoryEventStore>,
    pub documents: Arc<InMemoryDocumentStore>,
}

impl Stores {
    /// Seed `account-acc-7` with `count` deposits and create its document.
    pub async fn seeded(count: i64) -> Self {
        let events = Arc::new(InMemoryEventStore::new());
        events
            .seed(SOURCE_STREAM, (0..count).map(deposit).collect())
            .await;

        let mut active = StreamInformation::new(SOURCE_STREAM, "blob", "events", "primary");
        active.current_stream_version = count - 1;
        let documents = Arc::new(InMemoryDocumentStore::new());
        documents
            .create(ObjectDocument::new(OBJECT_NAME, OBJECT_ID, active))
            .await
            .expect("create document");

        Self { events, documents }
    }

    pub async fn document(&self) -> ObjectDocument {
        self.documents
            .get(OBJECT_NAME, OBJECT_ID)
            .await
            .expect("load document")
    }

    /// Live context migrating the document's current active stream.
    pub async fn live(&self, target: &str) -> LiveMigrationContext {
        LiveMigrationContext::new(
            self.document().await,
            StreamTarget::new(target),
            self.events.clone(),
            self.events.clone(),
            self.documents.clone(),
        )
    }

    /// Saga context migrating the document's current active stream.
    pub async fn saga(&self, target: &str) -> MigrationContext {
        MigrationContext::new(
            self.document().await,
            StreamTarget::new(target),
            self.events.clone(),
            self.events.clone(),
            self.documents.clone(),
        )
    }
}
