use super::manifest::CompactionManifest;
use crate::eventlog::Event;
use std::collections::{BTreeSet, HashSet};

/// A compaction marker visible in the live cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMarker {
    /// Log ids of the marker events this view stands for, oldest first.
    /// Empty for in-memory passes.
    pub event_ids: Vec<String>,
    /// 0 for a fresh marker; one more than its deepest input once merged.
    pub level: u32,
    pub manifest: CompactionManifest,
}

impl CacheMarker {
    pub fn new(event_id: Option<String>, manifest: CompactionManifest) -> Self {
        Self {
            event_ids: event_id.into_iter().collect(),
            level: 0,
            manifest,
        }
    }

    /// One marker covering `self` followed by `later`.
    pub fn merge(self, later: Self) -> Self {
        let mut event_ids = self.event_ids;
        event_ids.extend(later.event_ids);
        Self {
            event_ids,
            level: self.level.max(later.level) + 1,
            manifest: self.manifest.merge(&later.manifest),
        }
    }
}

/// The live, resubmittable projection of a session's log.
///
/// Owned by the turn loop. Events stay in append order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextCache {
    pub events: Vec<Event>,
    pub markers: Vec<CacheMarker>,
}

impl ContextCache {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            markers: Vec::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.events.iter().any(|e| e.id == event_id)
    }

    /// Token cost of the cached events. Markers are not counted.
    pub fn total_tokens(&self) -> u64 {
        self.events.iter().map(|e| e.tokens).sum()
    }

    /// Turn ids of the `n` most recent distinct turns.
    pub fn hot_tail_turns(&self, n: usize) -> HashSet<u64> {
        let turns: BTreeSet<u64> = self.events.iter().map(|e| e.turn_id).collect();
        turns.into_iter().rev().take(n).collect()
    }

    /// Merge the two oldest markers until at most `cap` remain (never
    /// fewer than one). Every merged pointer stays reachable through the
    /// surviving marker. Returns the number of merges.
    pub fn merge_markers(&mut self, cap: usize) -> usize {
        let mut merges = 0;
        while self.markers.len() > cap.max(1) {
            let later = self.markers.remove(1);
            let oldest = self.markers.remove(0);
            self.markers.insert(0, oldest.merge(later));
            merges += 1;
        }
        merges
    }
}
