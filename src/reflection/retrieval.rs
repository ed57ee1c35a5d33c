use super::journal::ReflectionJournal;
use super::types::{
    ActionTaken, CompactionReflection, PreCompactionState, REFLECTION_TAG, ReflectionRecord, Severity,
};
use crate::compaction::CompactionManifest;
use crate::config::ReflectionConfig;
use crate::error::EventLogError;
use crate::eventlog::{Event, EventInput, EventKind, EventLog};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Tool names (and content substrings) that identify a recall invocation.
pub const RECALL_TOOLS: &[&str] = &[
    "recall",
    "engram_recall",
    "memory_recall",
    "push_pack",
    "retrieve_memory",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallOutcome {
    Hit,
    Miss,
    FalsePositive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecallStats {
    pub attempts: usize,
    pub hits: usize,
    pub misses: usize,
    pub false_positives: usize,
}

impl RecallStats {
    /// `misses / (hits + misses)`, zero when neither happened.
    #[allow(clippy::cast_precision_loss)]
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}

fn is_recall_call(event: &Event) -> bool {
    if event.kind != EventKind::ToolCall {
        return false;
    }
    if let Some(name) = event.tool_name() {
        let name = name.to_lowercase();
        if RECALL_TOOLS.contains(&name.as_str()) {
            return true;
        }
    }
    let content = event.content.to_lowercase();
    RECALL_TOOLS.iter().any(|p| content.contains(p))
}

fn has_empty_events_array(content: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => value
            .get("events")
            .and_then(serde_json::Value::as_array)
            .is_some_and(Vec::is_empty),
        Err(_) => content.contains("\"events\":[]") || content.contains("\"events\": []"),
    }
}

/// Grade one recall result. `None` means the call never got a result.
pub fn classify_result(result: Option<&str>, config: &ReflectionConfig) -> RecallOutcome {
    let Some(content) = result else {
        return RecallOutcome::Miss;
    };
    let trimmed = content.trim();
    let lower = trimmed.to_lowercase();
    let chars = trimmed.chars().count();
    if lower.contains("no results")
        || lower.contains("no events")
        || has_empty_events_array(trimmed)
        || chars < config.min_result_chars
    {
        RecallOutcome::Miss
    } else if chars < config.useful_result_chars {
        RecallOutcome::FalsePositive
    } else {
        RecallOutcome::Hit
    }
}

/// High when most recalls missed or many were useless; medium for a
/// noticeable share; low otherwise.
pub fn severity_for(stats: &RecallStats) -> Severity {
    if stats.hits + stats.misses == 0 && stats.false_positives == 0 {
        return Severity::Low;
    }
    let miss_rate = stats.miss_rate();
    if miss_rate > 0.6 || stats.false_positives > 3 {
        Severity::High
    } else if miss_rate > 0.3 || stats.false_positives > 1 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Pair every recall call up to `up_to_turn` with the next tool result of
/// the same turn and grade it.
pub fn collect_recall_stats(events: &[Event], up_to_turn: u64, config: &ReflectionConfig) -> RecallStats {
    let scoped: Vec<&Event> = events.iter().filter(|e| e.turn_id <= up_to_turn).collect();
    let mut stats = RecallStats::default();
    for (i, call) in scoped.iter().enumerate() {
        if !is_recall_call(call) {
            continue;
        }
        let result = scoped[i + 1..]
            .iter()
            .find(|r| r.kind == EventKind::ToolResult && r.turn_id == call.turn_id)
            .map(|r| r.content.as_str());
        stats.attempts += 1;
        match classify_result(result, config) {
            RecallOutcome::Hit => stats.hits += 1,
            RecallOutcome::Miss => stats.misses += 1,
            RecallOutcome::FalsePositive => stats.false_positives += 1,
        }
    }
    stats
}

fn diagnosis(stats: &RecallStats, manifest: Option<&CompactionManifest>) -> String {
    let volume = manifest.map(|m| {
        format!(
            "Compacted {} events ({} tokens).",
            m.event_count, m.token_count
        )
    });
    if stats.hits + stats.misses == 0 && stats.false_positives == 0 {
        return match volume {
            Some(v) => format!("No retrieval activity detected around compaction. {v}"),
            None => "No retrieval activity detected around compaction.".to_string(),
        };
    }
    let pct = (stats.miss_rate() * 100.0).round();
    let mut parts = vec![format!(
        "Retrieval: {} hits, {} misses ({pct}% miss rate).",
        stats.hits, stats.misses
    )];
    if stats.false_positives > 0 {
        parts.push(format!("{} false positive(s).", stats.false_positives));
    }
    parts.extend(volume);
    parts.join(" ")
}

fn learning(severity: Severity, stats: &RecallStats) -> &'static str {
    match severity {
        Severity::High if stats.misses > stats.hits => {
            "High miss rate suggests critical events were evicted before retrieval. \
             Consider increasing the hot-tail size or tagging important events non-evictable."
        }
        Severity::High if stats.false_positives > 3 => {
            "Many false positives indicate poor retrieval precision. \
             Consider refining recall query construction."
        }
        Severity::High => "Compaction quality is poor. Manual review recommended.",
        Severity::Medium if stats.misses > 0 => {
            "Moderate miss rate. Monitor retrieval coverage and consider demoting \
             rarely recalled event kinds first."
        }
        Severity::Medium => "Some false positives detected. Retrieval works but is imprecise.",
        Severity::Low if stats.attempts == 0 => {
            "No retrieval activity detected. Compaction proceeded with no recall pressure."
        }
        Severity::Low => "Retrieval quality is good. Compaction is within acceptable parameters.",
    }
}

/// Grades a compaction by how well later recalls recovered what it evicted.
pub struct CompactionReflector {
    log: Arc<EventLog>,
    config: ReflectionConfig,
    journal: Option<Arc<ReflectionJournal>>,
}

impl CompactionReflector {
    pub fn new(log: Arc<EventLog>, config: ReflectionConfig) -> Self {
        Self {
            log,
            config,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<ReflectionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Grade the compaction marked by `marker_event_id` and persist the
    /// result as a tagged system note (and a journal line when a journal is
    /// attached). A missing or malformed marker grades with empty defaults.
    pub async fn reflect(
        &self,
        marker_event_id: &str,
        pre: &PreCompactionState,
    ) -> Result<CompactionReflection, EventLogError> {
        let events = match self.log.read_all().await {
            Ok(events) => events,
            Err(e) => {
                warn!(session = %self.log.session_key(), error = %e, "reflection could not read log; grading empty");
                Vec::new()
            }
        };
        let marker = events.iter().find(|e| e.id == marker_event_id);
        if marker.is_none() {
            warn!(marker = %marker_event_id, "compaction marker not found; grading without manifest");
        }
        let manifest = marker.and_then(|m| CompactionManifest::parse_lenient(&m.content));
        let up_to_turn = marker.map_or(u64::MAX, |m| m.turn_id);
        let marker_turn = marker.map_or(0, |m| m.turn_id);

        let stats = collect_recall_stats(&events, up_to_turn, &self.config);
        let severity = severity_for(&stats);
        let action_taken = match severity {
            Severity::High => ActionTaken::FlaggedForReview,
            Severity::Medium if stats.misses > 0 => ActionTaken::WeightAdjusted,
            _ => ActionTaken::None,
        };
        let tokens_evicted = manifest.as_ref().map_or(0, |m| m.token_count);

        let reflection = CompactionReflection {
            marker_event_id: marker_event_id.to_string(),
            events_compacted: manifest.as_ref().map_or(0, |m| m.event_count),
            tokens_evicted,
            topics_evicted: manifest.as_ref().map(|m| m.topic_hints.clone()).unwrap_or_default(),
            recall_attempts: stats.attempts,
            hits: stats.hits,
            misses: stats.misses,
            false_positives: stats.false_positives,
            miss_rate: stats.miss_rate(),
            severity,
            diagnosis: diagnosis(&stats, manifest.as_ref()),
            learning: learning(severity, &stats).to_string(),
            action_taken,
            needs_human_review: severity == Severity::High,
            context_tokens_before: pre.context_tokens,
            context_tokens_after: pre.context_tokens.saturating_sub(tokens_evicted),
            timestamp: Utc::now(),
        };

        let note = serde_json::to_string(&reflection)?;
        self.log
            .append(EventInput::new(marker_turn, EventKind::SystemNote, note).with_tag(REFLECTION_TAG))
            .await?;

        if let Some(journal) = &self.journal
            && let Err(e) = journal.append(&ReflectionRecord::from(&reflection)).await
        {
            warn!(error = %e, "failed to journal compaction reflection");
        }

        info!(
            marker = %marker_event_id,
            severity = %reflection.severity,
            attempts = stats.attempts,
            miss_rate = reflection.miss_rate,
            "compaction reflected"
        );
        Ok(reflection)
    }
}
