use crate::eventlog::{Event, EventKind, RESERVED_TAGS};
use crate::utils::text::estimate_tokens;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tag carried by every pointer-compaction marker event.
pub const POINTER_COMPACTION_TAG: &str = "pointer_compaction";

const MAX_TOPIC_HINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIdRange {
    pub first: String,
    pub last: String,
}

/// What one compaction cycle evicted and how to find it again.
///
/// Unknown or missing fields deserialize to defaults, so a damaged marker
/// still yields a usable (empty) manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionManifest {
    pub event_id_range: Option<EventIdRange>,
    pub artifact_refs: Vec<String>,
    pub topic_hints: Vec<String>,
    pub event_count: usize,
    pub token_count: u64,
}

impl CompactionManifest {
    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }

    /// Parse a marker's content. Missing fields default; `None` if the
    /// content is not a JSON object at all.
    pub fn parse_lenient(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }

    /// Fold a later manifest into this one: the id range spans both, counts
    /// add up, artifacts and topic hints are unioned in order.
    pub fn merge(&self, later: &Self) -> Self {
        let event_id_range = match (&self.event_id_range, &later.event_id_range) {
            (Some(a), Some(b)) => Some(EventIdRange {
                first: a.first.clone(),
                last: b.last.clone(),
            }),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        let mut artifact_refs = self.artifact_refs.clone();
        for artifact in &later.artifact_refs {
            if !artifact_refs.contains(artifact) {
                artifact_refs.push(artifact.clone());
            }
        }
        let mut topic_hints: Vec<String> = Vec::new();
        for hint in self.topic_hints.iter().chain(&later.topic_hints) {
            if topic_hints.len() == MAX_TOPIC_HINTS {
                break;
            }
            if !topic_hints.iter().any(|h| h.eq_ignore_ascii_case(hint)) {
                topic_hints.push(hint.clone());
            }
        }
        Self {
            event_id_range,
            artifact_refs,
            topic_hints,
            event_count: self.event_count + later.event_count,
            token_count: self.token_count + later.token_count,
        }
    }

    /// Estimated token cost of the manifest as stored in the log.
    pub fn estimated_tokens(&self) -> u64 {
        serde_json::to_string(self)
            .map(|json| estimate_tokens(&json))
            .unwrap_or(0)
    }
}

/// Build a manifest from the evicted events, in eviction order.
pub fn build_manifest<'a>(evicted: impl IntoIterator<Item = &'a Event>) -> CompactionManifest {
    let mut first: Option<&str> = None;
    let mut last: Option<&str> = None;
    let mut artifact_refs: Vec<String> = Vec::new();
    let mut tag_counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut event_count = 0;
    let mut token_count = 0;

    for event in evicted {
        first.get_or_insert(event.id.as_str());
        last = Some(event.id.as_str());
        event_count += 1;
        token_count += event.tokens;

        if event.kind == EventKind::ArtifactReference {
            let artifact = event
                .metadata
                .artifact_id
                .clone()
                .unwrap_or_else(|| event.content.trim().to_string());
            if !artifact.is_empty() && !artifact_refs.contains(&artifact) {
                artifact_refs.push(artifact);
            }
        }

        for tag in &event.metadata.tags {
            if RESERVED_TAGS.contains(&tag.as_str()) {
                continue;
            }
            let seen = tag_counts.len();
            tag_counts.entry(tag.as_str()).or_insert((0, seen)).0 += 1;
        }
    }

    let mut ranked: Vec<(&str, (usize, usize))> = tag_counts.into_iter().collect();
    // Most frequent first; ties keep first-seen order.
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    let topic_hints = ranked
        .into_iter()
        .take(MAX_TOPIC_HINTS)
        .map(|(tag, _)| tag.to_string())
        .collect();

    CompactionManifest {
        event_id_range: first.zip(last).map(|(f, l)| EventIdRange {
            first: f.to_string(),
            last: l.to_string(),
        }),
        artifact_refs,
        topic_hints,
        event_count,
        token_count,
    }
}

/// One-line pointer the agent sees in place of the evicted events.
pub fn render_manifest(manifest: &CompactionManifest) -> String {
    let Some(range) = manifest.event_id_range.as_ref().filter(|_| !manifest.is_empty()) else {
        return "[Pointer manifest: no events evicted]".to_string();
    };
    let mut out = format!(
        "[Pointer manifest: events {}..{} ({} events, ~{} tokens).",
        range.first, range.last, manifest.event_count, manifest.token_count
    );
    if !manifest.topic_hints.is_empty() {
        out.push_str(" Topics: ");
        out.push_str(&manifest.topic_hints.join(", "));
        out.push('.');
    }
    if !manifest.artifact_refs.is_empty() {
        out.push_str(" Artifacts: ");
        out.push_str(&manifest.artifact_refs.join(", "));
        out.push('.');
    }
    out.push_str(" Use recall(query) to retrieve.]");
    out
}
