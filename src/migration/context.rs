//! Migration contexts and options.
//!
//! A context is built by the caller for one migration attempt and handed to
//! an executor. It is never persisted.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use uuid::Uuid;

use super::error::{MigrationError, Result};
use super::progress::{EventCopyProgress, LiveMigrationProgress, MigrationProgress};
use crate::config::{LiveMigrationConfig, LockConfig, SagaMigrationConfig};
use crate::model::{Event, ObjectDocument, StreamInformation};
use crate::storage::{DocumentStore, EventStore};
use crate::transform::EventTransformer;

/// Receives progress snapshots.
pub type ProgressCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Error a before-append hook may fail with.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Runs before each event is appended to the target. Failing aborts the
/// migration attempt.
pub type BeforeAppendHook =
    Arc<dyn Fn(&Event) -> BoxFuture<'static, std::result::Result<(), HookError>> + Send + Sync>;

/// Wrap an async closure as a [`BeforeAppendHook`]. The closure receives
/// its own copy of the event.
pub fn before_append_hook<F, Fut>(f: F) -> BeforeAppendHook
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HookError>> + Send + 'static,
{
    Arc::new(move |event: &Event| f(event.clone()).boxed())
}

/// Identity of the continuation stream.
///
/// Store and connection settings not overridden here are copied from the
/// source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub stream_identifier: String,
    pub stream_type: Option<String>,
    pub data_store: Option<String>,
    pub stream_connection_name: Option<String>,
}

impl StreamTarget {
    pub fn new(stream_identifier: impl Into<String>) -> Self {
        Self {
            stream_identifier: stream_identifier.into(),
            stream_type: None,
            data_store: None,
            stream_connection_name: None,
        }
    }

    /// A freshly named target stream for `object_id`.
    pub fn generate(object_id: &str) -> Self {
        Self::new(format!("{}-{}", object_id, Uuid::new_v4().simple()))
    }

    pub fn with_stream_type(mut self, stream_type: impl Into<String>) -> Self {
        self.stream_type = Some(stream_type.into());
        self
    }

    pub fn with_data_store(mut self, data_store: impl Into<String>) -> Self {
        self.data_store = Some(data_store.into());
        self
    }

    pub fn with_stream_connection_name(mut self, name: impl Into<String>) -> Self {
        self.stream_connection_name = Some(name.into());
        self
    }

    /// Descriptor of the target stream at `version`, derived from `source`.
    ///
    /// Chunk and snapshot bookkeeping belong to the source stream and are
    /// not carried over.
    pub fn stream_information(&self, source: &StreamInformation, version: i64) -> StreamInformation {
        let mut stream = source.clone();
        stream.stream_identifier = self.stream_identifier.clone();
        stream.current_stream_version = version;
        stream.stream_chunks.clear();
        stream.snapshots.clear();
        if let Some(stream_type) = &self.stream_type {
            stream.stream_type = stream_type.clone();
        }
        if let Some(data_store) = &self.data_store {
            stream.data_store = data_store.clone();
        }
        if let Some(name) = &self.stream_connection_name {
            stream.stream_connection_name = name.clone();
        }
        stream
    }
}

/// Options for the live migration executor.
#[derive(Clone)]
pub struct LiveMigrationOptions {
    /// Elapsed-time budget for the whole attempt.
    pub close_timeout: Duration,
    /// Pause between catch-up iterations while the target is behind.
    pub catch_up_delay: Duration,
    /// Maximum catch-up iterations; 0 means unlimited.
    pub max_iterations: u32,
    /// Called once per catch-up iteration.
    pub on_progress: Option<ProgressCallback<LiveMigrationProgress>>,
    /// Called once per copied event.
    pub on_event_copied: Option<ProgressCallback<EventCopyProgress>>,
    /// When set, events are appended one at a time after this hook.
    pub before_append: Option<BeforeAppendHook>,
}

impl Default for LiveMigrationOptions {
    fn default() -> Self {
        Self::from(&LiveMigrationConfig::default())
    }
}

impl From<&LiveMigrationConfig> for LiveMigrationOptions {
    fn from(config: &LiveMigrationConfig) -> Self {
        Self {
            close_timeout: Duration::from_millis(config.close_timeout_ms),
            catch_up_delay: Duration::from_millis(config.catch_up_delay_ms),
            max_iterations: config.max_iterations,
            on_progress: None,
            on_event_copied: None,
            before_append: None,
        }
    }
}

impl fmt::Debug for LiveMigrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveMigrationOptions")
            .field("close_timeout", &self.close_timeout)
            .field("catch_up_delay", &self.catch_up_delay)
            .field("max_iterations", &self.max_iterations)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_event_copied", &self.on_event_copied.is_some())
            .field("before_append", &self.before_append.is_some())
            .finish()
    }
}

/// Options for the saga migration executor.
#[derive(Clone)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub enable_backup: bool,
    pub enable_verification: bool,
    pub enable_book_closing: bool,
    pub supports_rollback: bool,
    pub fail_fast_on_transform_error: bool,
    pub preserve_timestamps: bool,
    /// How long to wait for the migration lock.
    pub lock_timeout: Duration,
    /// Interval between lease renewals.
    pub heartbeat_interval: Duration,
    /// Called on phase transitions and copy progress.
    pub on_progress: Option<ProgressCallback<MigrationProgress>>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self::from_config(&SagaMigrationConfig::default(), &LockConfig::default())
    }
}

impl MigrationOptions {
    pub fn from_config(saga: &SagaMigrationConfig, lock: &LockConfig) -> Self {
        Self {
            dry_run: saga.dry_run,
            enable_backup: saga.enable_backup,
            enable_verification: saga.enable_verification,
            enable_book_closing: saga.enable_book_closing,
            supports_rollback: saga.supports_rollback,
            fail_fast_on_transform_error: saga.fail_fast_on_transform_error,
            preserve_timestamps: saga.preserve_timestamps,
            lock_timeout: Duration::from_millis(lock.timeout_ms),
            heartbeat_interval: Duration::from_millis(lock.heartbeat_interval_ms),
            on_progress: None,
        }
    }
}

impl fmt::Debug for MigrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationOptions")
            .field("dry_run", &self.dry_run)
            .field("enable_backup", &self.enable_backup)
            .field("enable_verification", &self.enable_verification)
            .field("enable_book_closing", &self.enable_book_closing)
            .field("supports_rollback", &self.supports_rollback)
            .field("fail_fast_on_transform_error", &self.fail_fast_on_transform_error)
            .field("preserve_timestamps", &self.preserve_timestamps)
            .field("lock_timeout", &self.lock_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

fn validate_identity(document: &ObjectDocument, source: &str, target: &StreamTarget) -> Result<()> {
    if document.object_id.is_empty() || document.object_name.is_empty() {
        return Err(MigrationError::InvalidContext(
            "document has no object identity".to_string(),
        ));
    }
    if target.stream_identifier.is_empty() {
        return Err(MigrationError::InvalidContext(
            "target stream identifier is empty".to_string(),
        ));
    }
    if target.stream_identifier == source {
        return Err(MigrationError::InvalidContext(format!(
            "source and target are the same stream: {}",
            source
        )));
    }
    Ok(())
}

/// Context for one live migration attempt.
#[derive(Clone)]
pub struct LiveMigrationContext {
    pub migration_id: Uuid,
    /// Document of the object being migrated, as loaded by the caller.
    pub document: ObjectDocument,
    /// Stream being migrated away from. Defaults to the document's active stream.
    pub source_stream: StreamInformation,
    pub target: StreamTarget,
    pub source_store: Arc<dyn EventStore>,
    pub target_store: Arc<dyn EventStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub options: LiveMigrationOptions,
    pub transformer: Option<Arc<dyn EventTransformer>>,
}

impl LiveMigrationContext {
    pub fn new(
        document: ObjectDocument,
        target: StreamTarget,
        source_store: Arc<dyn EventStore>,
        target_store: Arc<dyn EventStore>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            migration_id: Uuid::new_v4(),
            source_stream: document.active.clone(),
            document,
            target,
            source_store,
            target_store,
            document_store,
            options: LiveMigrationOptions::default(),
            transformer: None,
        }
    }

    pub fn with_migration_id(mut self, migration_id: Uuid) -> Self {
        self.migration_id = migration_id;
        self
    }

    pub fn with_options(mut self, options: LiveMigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn EventTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Descriptor used to read and write the target before cutover.
    pub fn target_stream(&self) -> StreamInformation {
        self.target.stream_information(&self.source_stream, -1)
    }

    pub fn validate(&self) -> Result<()> {
        validate_identity(
            &self.document,
            &self.source_stream.stream_identifier,
            &self.target,
        )
    }
}

/// Context for one saga migration attempt. The source is the document's
/// active stream.
#[derive(Clone)]
pub struct MigrationContext {
    pub migration_id: Uuid,
    pub document: ObjectDocument,
    pub target: StreamTarget,
    pub source_store: Arc<dyn EventStore>,
    pub target_store: Arc<dyn EventStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub options: MigrationOptions,
    pub transformer: Option<Arc<dyn EventTransformer>>,
}

impl MigrationContext {
    pub fn new(
        document: ObjectDocument,
        target: StreamTarget,
        source_store: Arc<dyn EventStore>,
        target_store: Arc<dyn EventStore>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            migration_id: Uuid::new_v4(),
            document,
            target,
            source_store,
            target_store,
            document_store,
            options: MigrationOptions::default(),
            transformer: None,
        }
    }

    pub fn with_migration_id(mut self, migration_id: Uuid) -> Self {
        self.migration_id = migration_id;
        self
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn EventTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn source_stream(&self) -> &StreamInformation {
        &self.document.active
    }

    pub fn target_stream(&self) -> StreamInformation {
        self.target.stream_information(&self.document.active, -1)
    }

    pub fn validate(&self) -> Result<()> {
        validate_identity(
            &self.document,
            &self.document.active.stream_identifier,
            &self.target,
        )
    }
}
