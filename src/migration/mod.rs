//! Stream migration executors.
//!
//! Two executors move an object's events to a new stream and then switch
//! the object's document over to it:
//!
//! - [`LiveMigrationExecutor`]: for streams that keep receiving writes.
//!   Catches up, then closes the source optimistically.
//! - [`SagaMigrationExecutor`]: for quiesced streams. Runs a fixed phase
//!   sequence under the object's migration lock.

pub mod context;
pub mod cutover;
pub mod error;
pub mod live;
pub mod progress;
pub mod result;
pub mod saga;

pub use context::{
    before_append_hook, BeforeAppendHook, HookError, LiveMigrationContext,
    LiveMigrationOptions, MigrationContext, MigrationOptions, ProgressCallback, StreamTarget,
};
pub use cutover::{perform_cutover, CutoverRequest};
pub use error::{MigrationError, Result};
pub use live::LiveMigrationExecutor;
pub use progress::{
    EventCopyProgress, LiveMigrationProgress, LiveMigrationState, MigrationPhase,
    MigrationProgress,
};
pub use result::{
    CloseOutcome, LiveFailureKind, LiveMigrationOutcome, LiveMigrationResult, MigrationPlan,
    MigrationResult, MigrationStatistics, MigrationStatus,
};
pub use saga::phases::{RollbackHandler, SagaPhase};
pub use saga::{SagaMigrationExecutor, SagaRun};
