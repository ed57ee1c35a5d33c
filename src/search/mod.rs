//! Incremental full-text index over session logs, with a keyword-scan
//! fallback when FTS5 is unavailable.

mod extract;
mod index;
mod query;
mod schema;

pub use extract::{extract_text, role_for};
pub use index::{IndexStats, SearchIndex, StoredManifest, Watermark};
pub use query::{SearchHit, SearchQuery};
