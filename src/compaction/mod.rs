//! Budgeted eviction of the live cache, with manifests that point back into
//! the log.

mod cache;
mod manifest;
mod pointer;

pub use cache::{CacheMarker, ContextCache};
pub use manifest::{
    CompactionManifest, EventIdRange, POINTER_COMPACTION_TAG, build_manifest, render_manifest,
};
pub use pointer::{
    CompactionOutcome, CompactionPhase, PointerCompactor, pointer_compact, select_victims,
};
