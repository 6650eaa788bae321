//! Terminal results returned by the executors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::MigrationError;
use super::progress::MigrationPhase;
use crate::model::ObjectDocument;

/// How a successful live migration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This attempt closed the source and persisted the cutover.
    PerformedCutover,
    /// The source was already closed toward this target but the document
    /// still pointed at the source; this attempt persisted the cutover.
    ResumedCutover,
    /// The source already carried a close marker; nothing left to do.
    AlreadyClosed { continuation_stream_id: String },
    /// Another process had already pointed the document elsewhere.
    RedirectedElsewhere { active_stream_id: String },
}

impl CloseOutcome {
    /// Whether this attempt wrote the cutover.
    pub fn cutover_performed_here(&self) -> bool {
        matches!(
            self,
            CloseOutcome::PerformedCutover | CloseOutcome::ResumedCutover
        )
    }
}

/// Why a live migration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveFailureKind {
    TimedOut,
    IterationLimitExceeded,
    Cancelled,
    InvalidContext,
    Storage,
    Unexpected,
}

/// Terminal outcome of a live migration.
#[derive(Debug)]
pub enum LiveMigrationOutcome {
    Completed(CloseOutcome),
    Failed {
        kind: LiveFailureKind,
        message: String,
        error: Option<MigrationError>,
    },
}

/// Result of a live migration attempt.
#[derive(Debug)]
pub struct LiveMigrationResult {
    pub migration_id: Uuid,
    pub source_stream_id: String,
    pub target_stream_id: String,
    pub outcome: LiveMigrationOutcome,
    pub iterations: u32,
    pub total_events_copied: u64,
    pub events_skipped: u64,
    /// Last business-event version verified on the source (-1 if none).
    pub source_version: i64,
    /// Last version written to the target (-1 if none).
    pub target_version: i64,
    pub elapsed: Duration,
    /// Document as persisted by the cutover, when this attempt wrote it.
    pub document: Option<ObjectDocument>,
}

impl LiveMigrationResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, LiveMigrationOutcome::Completed(_))
    }

    pub fn close_outcome(&self) -> Option<&CloseOutcome> {
        match &self.outcome {
            LiveMigrationOutcome::Completed(close) => Some(close),
            LiveMigrationOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<LiveFailureKind> {
        match &self.outcome {
            LiveMigrationOutcome::Failed { kind, .. } => Some(*kind),
            LiveMigrationOutcome::Completed(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            LiveMigrationOutcome::Failed { message, .. } => Some(message),
            LiveMigrationOutcome::Completed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&MigrationError> {
        match &self.outcome {
            LiveMigrationOutcome::Failed { error, .. } => error.as_ref(),
            LiveMigrationOutcome::Completed(_) => None,
        }
    }
}

/// Counters accumulated across saga phases.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatistics {
    pub total_events: u64,
    pub events_processed: u64,
    pub events_transformed: u64,
    pub transformation_failures: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub events_per_second: f64,
}

impl MigrationStatistics {
    pub(crate) fn start() -> Self {
        Self {
            total_events: 0,
            events_processed: 0,
            events_transformed: 0,
            transformation_failures: 0,
            started_at: Utc::now(),
            completed_at: None,
            elapsed: Duration::ZERO,
            events_per_second: 0.0,
        }
    }

    pub(crate) fn finish(mut self, elapsed: Duration) -> Self {
        self.completed_at = Some(Utc::now());
        self.elapsed = elapsed;
        let secs = elapsed.as_secs_f64();
        self.events_per_second = if secs > 0.0 {
            self.events_processed as f64 / secs
        } else {
            0.0
        };
        self
    }
}

/// Feasibility plan returned by a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub source_stream_id: String,
    pub target_stream_id: String,
    /// Phases a real run would execute, in order.
    pub phases: Vec<MigrationPhase>,
    pub is_feasible: bool,
}

/// Terminal status of a saga migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Completed,
    Failed,
    DryRun,
}

/// Result of a saga migration attempt.
#[derive(Debug)]
pub struct MigrationResult {
    pub migration_id: Uuid,
    pub status: MigrationStatus,
    pub source_stream_id: String,
    pub target_stream_id: String,
    pub statistics: MigrationStatistics,
    pub completed_phases: Vec<MigrationPhase>,
    pub plan: Option<MigrationPlan>,
    /// Whether the rollback handler ran and succeeded.
    pub rolled_back: bool,
    pub error_message: Option<String>,
    pub error: Option<MigrationError>,
    /// Document as persisted by the cutover phase.
    pub document: Option<ObjectDocument>,
}

impl MigrationResult {
    pub fn is_success(&self) -> bool {
        self.status == MigrationStatus::Completed
    }
}
