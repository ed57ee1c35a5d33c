use super::types::{ReflectionMode, ReflectionRecord, Severity};
use chrono::{DateTime, Utc};

const HIGH_TOKENS: u64 = 40_000;
const HIGH_EVENTS: usize = 100;
const MEDIUM_TOKENS: u64 = 15_000;
const MEDIUM_EVENTS: usize = 30;

pub const SUGGEST_HOT_TAIL: &str = "increase hot-tail size";
pub const SUGGEST_NON_EVICTABLE: &str = "tag critical events non-evictable";

pub fn volume_severity(events_compacted: usize, tokens_evicted: u64) -> Severity {
    if tokens_evicted > HIGH_TOKENS || events_compacted > HIGH_EVENTS {
        Severity::High
    } else if tokens_evicted > MEDIUM_TOKENS || events_compacted > MEDIUM_EVENTS {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Grade a compaction by eviction size alone, for when no recall has
/// happened yet. Low severity resolves itself; anything above carries
/// suggestions and asks for review.
pub fn reflect_volume(events_compacted: usize, tokens_evicted: u64, now: DateTime<Utc>) -> ReflectionRecord {
    let severity = volume_severity(events_compacted, tokens_evicted);
    let (diagnosis, suggestions) = match severity {
        Severity::Low => (
            format!("Routine compaction: {events_compacted} events, {tokens_evicted} tokens evicted."),
            Vec::new(),
        ),
        Severity::Medium => (
            format!(
                "Sizeable compaction: {events_compacted} events, {tokens_evicted} tokens evicted."
            ),
            vec![SUGGEST_HOT_TAIL.to_string(), SUGGEST_NON_EVICTABLE.to_string()],
        ),
        Severity::High => (
            format!(
                "Heavy compaction: {events_compacted} events, {tokens_evicted} tokens evicted at once."
            ),
            vec![SUGGEST_HOT_TAIL.to_string(), SUGGEST_NON_EVICTABLE.to_string()],
        ),
    };
    ReflectionRecord {
        timestamp: now,
        mode: ReflectionMode::Volume,
        severity,
        diagnosis,
        suggestions,
        auto_fix_applied: severity == Severity::Low,
        needs_human_review: severity != Severity::Low,
        events_compacted,
        tokens_evicted,
        marker_event_id: None,
    }
}
