//! In-memory storage implementations.
//!
//! Used by the test suites and by hosts that embed the engine without a
//! persistent backend.

mod document_store;
mod event_store;

pub use document_store::InMemoryDocumentStore;
pub use event_store::InMemoryEventStore;
