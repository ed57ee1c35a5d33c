use super::anchor::extract_anchor;
use crate::config::ConceptConfig;
use crate::utils::text::{clip, collapse_whitespace, jaccard, word_set};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Importance-weighted score: 10 boosts by 15%, 0 discounts by 15%, 5 is
/// neutral.
pub fn weighted_score(base: f64, importance: u8) -> f64 {
    base * (1.0 + 0.15 * (f64::from(importance) - 5.0) / 5.0)
}

/// One indexed unit under an anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexChunk {
    /// Stable source key: an absolute file path or `event:<session>/<id>`.
    pub path: String,
    pub line: u64,
    pub score: f64,
    /// Unweighted score the enhancement pass derives `score` from.
    #[serde(default)]
    pub base_score: f64,
    pub source: String,
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub merged: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
    /// Keys of near-duplicates folded into this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IndexChunk {
    pub fn answers_to(&self, key: &str) -> bool {
        self.path == key || self.aliases.iter().any(|a| a == key)
    }

    /// Identity used to deduplicate recall results.
    pub fn dedup_key(&self) -> &str {
        self.event_id.as_deref().unwrap_or(&self.path)
    }
}

/// Raw material for a chunk: a file, an event, or anything else with a key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptUnit {
    pub key: String,
    pub line: u64,
    pub source: String,
    pub text: String,
    pub importance: Option<u8>,
    pub event_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConceptUnit {
    pub fn new(key: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            line: 1,
            source: source.into(),
            text: text.into(),
            importance: None,
            event_id: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptHit {
    pub anchor: String,
    pub chunk: IndexChunk,
    pub score: f64,
}

/// Anchor label → chunks. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptIndex {
    pub anchors: BTreeMap<String, Vec<IndexChunk>>,
}

impl ConceptIndex {
    pub fn chunk_count(&self) -> usize {
        self.anchors.values().map(Vec::len).sum()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.anchors
            .values()
            .flatten()
            .any(|chunk| chunk.answers_to(key))
    }

    /// Add `unit` under its extracted anchor. Returns false, changing
    /// nothing, when a chunk already answers to the unit's key.
    pub fn ingest(&mut self, unit: ConceptUnit, config: &ConceptConfig) -> bool {
        if self.contains_key(&unit.key) {
            return false;
        }
        let anchor = extract_anchor(&unit.text, config.anchor_terms);
        let importance = unit.importance.map(|i| i.min(10));
        let base_score = f64::from(importance.unwrap_or(config.default_importance)) / 10.0;
        let preview = clip(&collapse_whitespace(&unit.text), config.preview_chars).into_owned();
        self.anchors.entry(anchor).or_default().push(IndexChunk {
            path: unit.key,
            line: unit.line,
            score: base_score,
            base_score,
            source: unit.source,
            preview,
            importance,
            merged: false,
            related: Vec::new(),
            aliases: Vec::new(),
            event_id: unit.event_id,
            timestamp: unit.timestamp,
        });
        true
    }

    /// Remove every chunk whose own key is `key` and forget `key` as an
    /// alias elsewhere. Returns how many chunks went.
    pub fn remove_key(&mut self, key: &str) -> usize {
        for chunk in self.anchors.values_mut().flatten() {
            chunk.aliases.retain(|alias| alias != key);
        }
        self.retain(|chunk| chunk.path != key)
    }

    /// Keep chunks matching `keep`; drops anchors left empty. Returns the
    /// number of chunks removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&IndexChunk) -> bool) -> usize {
        let before = self.chunk_count();
        for chunks in self.anchors.values_mut() {
            chunks.retain(|c| keep(c));
        }
        self.anchors.retain(|_, chunks| !chunks.is_empty());
        before - self.chunk_count()
    }

    /// Chunks stored under exactly `anchor` (case and surrounding space
    /// ignored).
    pub fn lookup(&self, anchor: &str) -> Vec<IndexChunk> {
        let wanted = anchor.trim().to_lowercase();
        self.anchors.get(&wanted).cloned().unwrap_or_default()
    }

    /// Chunks ranked by word-set similarity of `anchor + preview` to the
    /// query, weighted by chunk score.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ConceptHit> {
        let wanted = word_set(query);
        if wanted.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<ConceptHit> = self
            .anchors
            .iter()
            .flat_map(|(anchor, chunks)| chunks.iter().map(move |c| (anchor, c)))
            .filter_map(|(anchor, chunk)| {
                let words = word_set(&format!("{anchor} {}", chunk.preview));
                let relevance = jaccard(&wanted, &words);
                (relevance > 0.0).then(|| ConceptHit {
                    anchor: anchor.clone(),
                    chunk: chunk.clone(),
                    score: relevance * chunk.score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}
