//! stream-migration - Stream migration engine for event-sourced storage
//!
//! Relocates the event history of one object from its active stream to a
//! new stream without losing or duplicating events, then switches the
//! object's document over to the new stream. Streams under active write
//! load use the live executor; quiesced streams use the saga executor.

pub mod config;
pub mod lock;
pub mod migration;
pub mod model;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod utils;

pub use config::MigrationConfig;
pub use lock::{DistributedLock, DistributedLockProvider, InMemoryLockProvider, LockError};
pub use migration::{
    LiveMigrationContext, LiveMigrationExecutor, LiveMigrationResult, MigrationContext,
    MigrationError, MigrationResult, SagaMigrationExecutor, StreamTarget,
};
pub use model::{Event, ObjectDocument, StreamInformation};
pub use storage::{DocumentStore, EventStore, StorageError};
pub use transform::{EventTransformer, TransformError};
