use super::chunk::{ConceptIndex, IndexChunk, weighted_score};
use crate::config::ConceptConfig;
use crate::utils::text::{jaccard, word_set};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Related links per point of connection bonus.
const LINKS_PER_BONUS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnhanceReport {
    /// Chunks folded into a near-duplicate during this pass.
    pub merged: usize,
    /// Related pairs present after the pass.
    pub related_links: usize,
}

/// Importance the score is weighted by, 1 to 10: the stored importance (or
/// `default_importance`), +2 if the chunk is under a day old or +1 under a
/// week, and +1 once it has at least three related links.
pub fn effective_importance(chunk: &IndexChunk, default_importance: u8, now: DateTime<Utc>) -> u8 {
    let base = chunk.importance.unwrap_or(default_importance);
    let recency = match chunk.timestamp.map(|ts| now - ts) {
        Some(age) if age < Duration::days(1) => 2,
        Some(age) if age < Duration::days(7) => 1,
        _ => 0,
    };
    let connections = u8::from(chunk.related.len() >= LINKS_PER_BONUS);
    base.saturating_add(recency + connections).clamp(1, 10)
}

/// Re-weight scores, merge near-duplicates and cross-link related chunks,
/// anchor by anchor. With the same `now`, running it twice in a row changes
/// nothing the second time.
pub fn enhance(index: &mut ConceptIndex, config: &ConceptConfig, now: DateTime<Utc>) -> EnhanceReport {
    let mut report = EnhanceReport::default();
    for chunks in index.anchors.values_mut() {
        let merged = merge_duplicates(chunks, config.merge_threshold);
        report.merged += merged;
        report.related_links += link_related(chunks, config);
        for chunk in chunks.iter_mut() {
            let importance = effective_importance(chunk, config.default_importance, now);
            chunk.score = weighted_score(chunk.base_score, importance);
        }
    }
    report
}

fn preview_len(chunk: &IndexChunk) -> usize {
    chunk.preview.chars().count()
}

/// Fold `absorbed` into `survivor`.
fn absorb(survivor: &mut IndexChunk, absorbed: IndexChunk) {
    survivor.merged = true;
    survivor.importance = survivor.importance.max(absorbed.importance);
    survivor.base_score = survivor.base_score.max(absorbed.base_score);
    survivor.aliases.push(absorbed.path);
    for alias in absorbed.aliases {
        if !survivor.aliases.contains(&alias) {
            survivor.aliases.push(alias);
        }
    }
}

/// Merge pairs whose similarity exceeds `threshold` until none remain.
/// The chunk with the longer preview survives.
fn merge_duplicates(chunks: &mut Vec<IndexChunk>, threshold: f64) -> usize {
    let mut merged = 0;
    loop {
        let sets: Vec<HashSet<String>> = chunks.iter().map(|c| word_set(&c.preview)).collect();
        let pair = (0..chunks.len())
            .flat_map(|i| (i + 1..chunks.len()).map(move |j| (i, j)))
            .find(|&(i, j)| jaccard(&sets[i], &sets[j]) > threshold);
        let Some((i, j)) = pair else { break };

        let (keep, gone) = if preview_len(&chunks[j]) > preview_len(&chunks[i]) {
            (j, i)
        } else {
            (i, j)
        };
        let absorbed = chunks[gone].clone();
        absorb(&mut chunks[keep], absorbed);
        chunks.remove(gone);
        merged += 1;
    }
    merged
}

/// Recompute related links inside one anchor from scratch, so links never
/// point at a chunk that has since been absorbed. Returns the number of pairs.
fn link_related(chunks: &mut [IndexChunk], config: &ConceptConfig) -> usize {
    let sets: Vec<HashSet<String>> = chunks.iter().map(|c| word_set(&c.preview)).collect();
    let mut links: Vec<Vec<String>> = vec![Vec::new(); chunks.len()];
    let mut pairs = 0;
    for i in 0..chunks.len() {
        for j in i + 1..chunks.len() {
            let sim = jaccard(&sets[i], &sets[j]);
            if sim >= config.related_threshold && sim <= config.merge_threshold {
                links[i].push(chunks[j].path.clone());
                links[j].push(chunks[i].path.clone());
                pairs += 1;
            }
        }
    }
    for (chunk, related) in chunks.iter_mut().zip(links) {
        chunk.related = related;
    }
    pairs
}
