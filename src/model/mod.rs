//! Domain records shared by the stores and the migration executors.

pub mod document;
pub mod event;

pub use document::{
    ChunkSettings, ObjectDocument, StreamChunk, StreamInformation, StreamSnapshot,
    TerminatedStream,
};
pub use event::{
    last_business_version, Event, StreamClosed, TerminationReason, STREAM_CLOSED_EVENT_TYPE,
};
