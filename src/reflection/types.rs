use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Tag carried by the system note a retrieval reflection persists.
pub const REFLECTION_TAG: &str = "compaction_reflection";

// Ordered so that `High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReflectionMode {
    Retrieval,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionTaken {
    None,
    WeightAdjusted,
    FlaggedForReview,
}

/// Context size the caller saw right before compacting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreCompactionState {
    pub context_tokens: u64,
    pub active_topics: Vec<String>,
}

/// Retrieval-quality grade of one compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionReflection {
    pub marker_event_id: String,
    pub events_compacted: usize,
    pub tokens_evicted: u64,
    #[serde(default)]
    pub topics_evicted: Vec<String>,
    pub recall_attempts: usize,
    pub hits: usize,
    pub misses: usize,
    pub false_positives: usize,
    pub miss_rate: f64,
    pub severity: Severity,
    pub diagnosis: String,
    pub learning: String,
    pub action_taken: ActionTaken,
    pub needs_human_review: bool,
    pub context_tokens_before: u64,
    pub context_tokens_after: u64,
    pub timestamp: DateTime<Utc>,
}

/// One line of the dated reflection journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub timestamp: DateTime<Utc>,
    pub mode: ReflectionMode,
    pub severity: Severity,
    pub diagnosis: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub auto_fix_applied: bool,
    #[serde(default)]
    pub needs_human_review: bool,
    #[serde(default)]
    pub events_compacted: usize,
    #[serde(default)]
    pub tokens_evicted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_event_id: Option<String>,
}

impl From<&CompactionReflection> for ReflectionRecord {
    fn from(r: &CompactionReflection) -> Self {
        Self {
            timestamp: r.timestamp,
            mode: ReflectionMode::Retrieval,
            severity: r.severity,
            diagnosis: r.diagnosis.clone(),
            suggestions: if r.severity == Severity::Low {
                Vec::new()
            } else {
                vec![r.learning.clone()]
            },
            auto_fix_applied: r.action_taken == ActionTaken::WeightAdjusted,
            needs_human_review: r.needs_human_review,
            events_compacted: r.events_compacted,
            tokens_evicted: r.tokens_evicted,
            marker_event_id: Some(r.marker_event_id.clone()),
        }
    }
}
