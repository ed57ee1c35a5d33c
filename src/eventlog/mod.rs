//! Durable, append-only record of every conversational unit.

mod store;
mod types;

pub use store::{EventLog, EventLogRegistry, LogSlice, sanitize_session_key, session_key_from_stem};
pub use types::{
    CONSTRAINT_TAG, Event, EventInput, EventKind, EventMetadata, MetadataPatch, RESERVED_TAGS,
};
