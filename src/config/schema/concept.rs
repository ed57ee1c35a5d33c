use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptConfig {
    /// Number of frequent tokens joined into an anchor label
    #[serde(default = "default_anchor_terms")]
    pub anchor_terms: usize,
    /// Jaccard similarity above which two chunks merge
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,
    /// Lower bound of the related band (inclusive)
    #[serde(default = "default_related_threshold")]
    pub related_threshold: f64,
    /// Importance (0–10) assumed when a unit carries none
    #[serde(default = "default_importance")]
    pub default_importance: u8,
    /// File extensions picked up by the filesystem rebuild, without dots
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Trailing window for the event-driven rebuild
    #[serde(default = "default_rebuild_window_hours")]
    pub rebuild_window_hours: u32,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_anchor_terms() -> usize {
    3
}
fn default_merge_threshold() -> f64 {
    0.9
}
fn default_related_threshold() -> f64 {
    0.7
}
fn default_importance() -> u8 {
    5
}
fn default_extensions() -> Vec<String> {
    vec!["md".into(), "txt".into(), "rs".into()]
}
fn default_max_files() -> usize {
    500
}
fn default_rebuild_window_hours() -> u32 {
    24
}
fn default_preview_chars() -> usize {
    240
}

impl Default for ConceptConfig {
    fn default() -> Self {
        Self {
            anchor_terms: default_anchor_terms(),
            merge_threshold: default_merge_threshold(),
            related_threshold: default_related_threshold(),
            default_importance: default_importance(),
            extensions: default_extensions(),
            max_files: default_max_files(),
            rebuild_window_hours: default_rebuild_window_hours(),
            preview_chars: default_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodicConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_ttl_hours() -> u32 {
    24
}
fn default_max_entries() -> usize {
    1024
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            max_entries: default_max_entries(),
        }
    }
}
