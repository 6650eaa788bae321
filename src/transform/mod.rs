//! Event transformation during copy.
//!
//! Transformers rewrite events on their way to the target stream, typically
//! to upgrade payload schemas. A transformer may fail for an individual
//! event; the executors decide whether that skips the event or aborts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::Event;

/// Errors a transformer may report for a single event.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("No transformation for {event_type} schema v{schema_version}")]
    Unsupported {
        event_type: String,
        schema_version: u32,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Transformation cancelled")]
    Cancelled,

    #[error("Transformation failed: {0}")]
    Failed(String),
}

/// Maps one event to another.
///
/// Implementations must not change `event_version`; the executors restore
/// the source version if they do.
#[async_trait]
pub trait EventTransformer: Send + Sync {
    async fn transform(
        &self,
        event: Event,
        cancel: &CancellationToken,
    ) -> Result<Event, TransformError>;
}

/// Applies transformers in order, feeding each the previous output.
#[derive(Default, Clone)]
pub struct TransformerChain {
    transformers: Vec<Arc<dyn EventTransformer>>,
}

impl TransformerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transformer: Arc<dyn EventTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

#[async_trait]
impl EventTransformer for TransformerChain {
    async fn transform(
        &self,
        mut event: Event,
        cancel: &CancellationToken,
    ) -> Result<Event, TransformError> {
        for transformer in &self.transformers {
            if cancel.is_cancelled() {
                return Err(TransformError::Cancelled);
            }
            event = transformer.transform(event, cancel).await?;
        }
        Ok(event)
    }
}

/// Adapts a synchronous closure into an [`EventTransformer`].
pub struct FnTransformer<F> {
    f: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(Event) -> Result<Event, TransformError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EventTransformer for FnTransformer<F>
where
    F: Fn(Event) -> Result<Event, TransformError> + Send + Sync,
{
    async fn transform(
        &self,
        event: Event,
        cancel: &CancellationToken,
    ) -> Result<Event, TransformError> {
        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled);
        }
        (self.f)(event)
    }
}

/// How a copied event differs from its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSummary {
    pub original_event_type: String,
    pub original_schema_version: u32,
    pub event_type: String,
    pub schema_version: u32,
}

impl TransformSummary {
    /// Compare an event before and after transformation. `None` if the
    /// type, schema version and payload are unchanged.
    pub fn between(before: &Event, after: &Event) -> Option<Self> {
        if before.event_type == after.event_type
            && before.schema_version == after.schema_version
            && before.payload == after.payload
        {
            return None;
        }
        Some(Self {
            original_event_type: before.event_type.clone(),
            original_schema_version: before.schema_version,
            event_type: after.event_type.clone(),
            schema_version: after.schema_version,
        })
    }
}
