use super::chunk::{ConceptIndex, IndexChunk, weighted_score};
use crate::config::EpisodicConfig;
use crate::utils::text::{jaccard, word_set};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

/// A short-lived observation kept outside the durable index.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodicEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub importance: Option<u8>,
}

impl EpisodicEntry {
    pub fn new(id: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            content: content.into(),
            importance: None,
        }
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = Some(importance.min(10));
        self
    }
}

/// Bounded, TTL-limited overlay consulted before the concept index.
#[derive(Debug, Clone)]
pub struct EpisodicBuffer {
    entries: VecDeque<EpisodicEntry>,
    ttl: Duration,
    max_entries: usize,
    default_importance: u8,
}

impl EpisodicBuffer {
    pub fn new(config: &EpisodicConfig, default_importance: u8) -> Self {
        Self {
            entries: VecDeque::new(),
            ttl: Duration::hours(i64::from(config.ttl_hours)),
            max_entries: config.max_entries.max(1),
            default_importance,
        }
    }

    /// Add `entry`, dropping the oldest when full.
    pub fn add(&mut self, entry: EpisodicEntry) {
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Drop entries older than the TTL. Returns how many went.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp >= cutoff);
        before - self.entries.len()
    }

    /// Live entries, oldest first.
    pub fn recent(&self, now: DateTime<Utc>) -> Vec<&EpisodicEntry> {
        let cutoff = now - self.ttl;
        self.entries.iter().filter(|e| e.timestamp >= cutoff).collect()
    }

    /// Live entries ranked by word overlap with `query`, weighted by
    /// importance. Entries with no overlap are left out.
    pub fn search(&self, query: &str, top_n: usize, now: DateTime<Utc>) -> Vec<(EpisodicEntry, f64)> {
        let wanted = word_set(query);
        if wanted.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<(EpisodicEntry, f64)> = self
            .recent(now)
            .into_iter()
            .filter_map(|entry| {
                let relevance = jaccard(&wanted, &word_set(&entry.content));
                let importance = entry.importance.unwrap_or(self.default_importance);
                let score = weighted_score(relevance, importance);
                (score > 0.0).then(|| (entry.clone(), score))
            })
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.timestamp.cmp(&a.0.timestamp)));
        hits.truncate(top_n);
        hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecallHit {
    Episodic { entry: EpisodicEntry, score: f64 },
    Concept { anchor: String, chunk: IndexChunk, score: f64 },
}

impl RecallHit {
    pub fn dedup_key(&self) -> &str {
        match self {
            Self::Episodic { entry, .. } => &entry.id,
            Self::Concept { chunk, .. } => chunk.dedup_key(),
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Self::Episodic { score, .. } | Self::Concept { score, .. } => *score,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Episodic { entry, .. } => &entry.content,
            Self::Concept { chunk, .. } => &chunk.preview,
        }
    }
}

/// Episodic hits first, then concept hits, without duplicates, at most
/// `top_n` in total.
pub fn combined_query(
    buffer: &EpisodicBuffer,
    index: &ConceptIndex,
    query: &str,
    top_n: usize,
    now: DateTime<Utc>,
) -> Vec<RecallHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::with_capacity(top_n);
    let episodic = buffer
        .search(query, top_n, now)
        .into_iter()
        .map(|(entry, score)| RecallHit::Episodic { entry, score });
    let concept = index
        .search(query, top_n)
        .into_iter()
        .map(|hit| RecallHit::Concept {
            anchor: hit.anchor,
            chunk: hit.chunk,
            score: hit.score,
        });
    for hit in episodic.chain(concept) {
        if hits.len() >= top_n {
            break;
        }
        if seen.insert(hit.dedup_key().to_string()) {
            hits.push(hit);
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::chunk::ConceptUnit;
    use crate::config::ConceptConfig;

    fn buffer(max_entries: usize) -> EpisodicBuffer {
        EpisodicBuffer::new(
            &EpisodicConfig {
                ttl_hours: 1,
                max_entries,
            },
            5,
        )
    }

    #[test]
    fn capacity_drops_oldest() {
        let now = Utc::now();
        let mut buf = buffer(2);
        buf.add(EpisodicEntry::new("a", "first", now));
        buf.add(EpisodicEntry::new("b", "second", now));
        buf.add(EpisodicEntry::new("c", "third", now));
        let ids: Vec<_> = buf.recent(now).iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn expire_removes_stale_entries() {
        let now = Utc::now();
        let mut buf = buffer(8);
        buf.add(EpisodicEntry::new("old", "stale note", now - Duration::hours(2)));
        buf.add(EpisodicEntry::new("new", "fresh note", now));
        assert_eq!(buf.recent(now).len(), 1);
        assert_eq!(buf.expire(now), 1);
        assert_eq!(buf.len(), 1);
        buf.clear();
        assert!(buf.is_empty());
    }

    #[test]
    fn search_prefers_important_overlap() {
        let now = Utc::now();
        let mut buf = buffer(8);
        buf.add(EpisodicEntry::new("low", "deploy failed on staging", now).with_importance(1));
        buf.add(EpisodicEntry::new("high", "deploy failed on staging", now).with_importance(10));
        buf.add(EpisodicEntry::new("other", "lunch order", now));
        let hits = buf.search("staging deploy", 5, now);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "high");
    }

    #[test]
    fn combined_query_puts_episodic_first_and_dedups() {
        let now = Utc::now();
        let mut buf = buffer(8);
        buf.add(EpisodicEntry::new("evt-1", "kafka consumer lag spike", now));

        let config = ConceptConfig::default();
        let mut index = ConceptIndex::default();
        let mut dup = ConceptUnit::new("event:s/evt-1", "user_message", "kafka consumer lag spike");
        dup.event_id = Some("evt-1".into());
        index.ingest(dup, &config);
        index.ingest(
            ConceptUnit::new("/notes/kafka.md", "file", "kafka consumer tuning guide"),
            &config,
        );

        let hits = combined_query(&buf, &index, "kafka consumer lag", 10, now);
        assert!(matches!(hits[0], RecallHit::Episodic { .. }));
        let keys: Vec<_> = hits.iter().map(RecallHit::dedup_key).collect();
        assert_eq!(keys, ["evt-1", "/notes/kafka.md"]);
    }

    #[test]
    fn combined_query_honors_top_n() {
        let now = Utc::now();
        let mut buf = buffer(8);
        for i in 0..5 {
            buf.add(EpisodicEntry::new(format!("e{i}"), "disk pressure alert", now));
        }
        let hits = combined_query(&buf, &ConceptIndex::default(), "disk pressure", 3, now);
        assert_eq!(hits.len(), 3);
    }
}
