//! Concept index: anchor-labelled chunks of files and events, with an
//! episodic overlay for recent observations.

pub mod anchor;
pub mod chunk;
pub mod enhance;
pub mod episodic;
pub mod rebuild;
pub mod store;

pub use anchor::{FALLBACK_ANCHOR, extract_anchor, tokenize};
pub use chunk::{ConceptHit, ConceptIndex, ConceptUnit, IndexChunk, weighted_score};
pub use enhance::{EnhanceReport, effective_importance, enhance};
pub use episodic::{EpisodicBuffer, EpisodicEntry, RecallHit, combined_query};
pub use rebuild::RebuildReport;
pub use store::{ConceptStore, RebuildState};
