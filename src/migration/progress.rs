//! Progress snapshots emitted while a migration runs.

use std::fmt;
use std::time::Duration;

use crate::transform::TransformSummary;

/// Live executor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMigrationState {
    Idle,
    CatchingUp,
    Synced,
    AttemptingClose,
    ConflictDetected,
    Closed,
    UpdatingDocument,
    Completed,
    Failed,
}

/// Reported once per catch-up iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMigrationProgress {
    pub iteration: u32,
    pub source_version: i64,
    pub target_version: i64,
    pub events_copied_this_iteration: u64,
    pub total_events_copied: u64,
    pub elapsed: Duration,
    pub is_synced: bool,
}

/// Reported once per event written to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCopyProgress {
    pub event_type: String,
    pub event_version: i64,
    /// `Some` when the transformer changed the event.
    pub transformation: Option<TransformSummary>,
    pub total_events_copied: u64,
}

impl EventCopyProgress {
    pub fn was_transformed(&self) -> bool {
        self.transformation.is_some()
    }
}

/// Saga executor phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationPhase {
    AcquireLock,
    Backup,
    Analyze,
    CopyTransform,
    Verify,
    Cutover,
    BookClosing,
    Rollback,
    ReleaseLock,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::AcquireLock => "acquire_lock",
            MigrationPhase::Backup => "backup",
            MigrationPhase::Analyze => "analyze",
            MigrationPhase::CopyTransform => "copy_transform",
            MigrationPhase::Verify => "verify",
            MigrationPhase::Cutover => "cutover",
            MigrationPhase::BookClosing => "book_closing",
            MigrationPhase::Rollback => "rollback",
            MigrationPhase::ReleaseLock => "release_lock",
        };
        f.write_str(name)
    }
}

/// Reported by the saga executor on phase entry and during the copy.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationProgress {
    pub phase: MigrationPhase,
    pub events_processed: u64,
    pub total_events: u64,
    pub elapsed: Duration,
}

impl MigrationProgress {
    /// Share of source events processed, 0-100.
    pub fn percent_complete(&self) -> f64 {
        if self.total_events == 0 {
            return 100.0;
        }
        (self.events_processed as f64 / self.total_events as f64) * 100.0
    }
}
