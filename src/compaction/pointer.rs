use super::cache::{CacheMarker, ContextCache};
use super::manifest::{CompactionManifest, POINTER_COMPACTION_TAG, build_manifest, render_manifest};
use crate::config::CompactionConfig;
use crate::error::{CompactionError, EventLogError};
use crate::eventlog::{Event, EventInput, EventKind, EventLog};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Stages of one compaction cycle. A cycle that finds nothing to do returns
/// to `Idle` straight from `Evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPhase {
    Idle,
    Evaluate,
    Evict,
    Manifest,
    Persist,
}

/// Outcome returned after a compaction attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionOutcome {
    pub evicted_count: usize,
    pub markers_created: usize,
    pub marker_event_id: Option<String>,
    pub summary: String,
    pub manifest: CompactionManifest,
    pub tokens_before: u64,
    pub tokens_after: u64,
}

impl CompactionOutcome {
    fn idle(tokens: u64) -> Self {
        let manifest = CompactionManifest::default();
        Self {
            evicted_count: 0,
            markers_created: 0,
            marker_event_id: None,
            summary: render_manifest(&manifest),
            manifest,
            tokens_before: tokens,
            tokens_after: tokens,
        }
    }
}

/// Pick events to evict, as indices into `cache.events` in eviction order.
///
/// Events in the hot tail or flagged non-evictable are never candidates.
/// Events already marked low-priority or superseded go first, then by
/// [`EventKind::eviction_rank`], then oldest turn first. Selection stops as
/// soon as the cache fits `ctx - headroom`, or when candidates run out.
pub fn select_victims(cache: &ContextCache, config: &CompactionConfig) -> Vec<usize> {
    let target = config.target_tokens();
    let mut total = cache.total_tokens();
    if total <= target {
        return Vec::new();
    }

    let hot = cache.hot_tail_turns(config.hot_tail_turns);
    let mut candidates: Vec<usize> = cache
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| !hot.contains(&e.turn_id) && !e.is_non_evictable())
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by_key(|&i| {
        let e = &cache.events[i];
        let demoted = e.metadata.low_priority || e.metadata.superseded_by.is_some();
        (!demoted, e.kind.eviction_rank(), e.turn_id, i)
    });

    let mut victims = Vec::new();
    for i in candidates {
        if total <= target {
            break;
        }
        total = total.saturating_sub(cache.events[i].tokens);
        victims.push(i);
    }
    victims
}

/// Remove `victims` from the cache, returning them in eviction order.
fn take_victims(cache: &mut ContextCache, victims: &[usize]) -> Vec<Event> {
    let mut slots: Vec<Option<Event>> = std::mem::take(&mut cache.events)
        .into_iter()
        .map(Some)
        .collect();
    let evicted = victims.iter().filter_map(|&i| slots[i].take()).collect();
    cache.events = slots.into_iter().flatten().collect();
    evicted
}

/// Compact `cache` in memory until it fits or nothing more can be evicted.
///
/// Returns the number of cycles performed; 0 means the cache was already
/// within budget or had nothing evictable. The markers pushed here have no
/// log entry; use [`PointerCompactor`] for durable compaction.
pub fn pointer_compact(cache: &mut ContextCache, config: &CompactionConfig) -> usize {
    let mut cycles = 0;
    loop {
        let victims = select_victims(cache, config);
        if victims.is_empty() {
            break;
        }
        let evicted = take_victims(cache, &victims);
        cache
            .markers
            .push(CacheMarker::new(None, build_manifest(&evicted)));
        cache.merge_markers(config.marker_soft_cap);
        cycles += 1;
    }
    cycles
}

/// Durable pointer compaction for one session.
///
/// The manifest marker is written to the log before the cache is touched, so
/// a failed append leaves the cache exactly as it was.
pub struct PointerCompactor {
    log: Arc<EventLog>,
    config: CompactionConfig,
}

impl PointerCompactor {
    pub fn new(log: Arc<EventLog>, config: CompactionConfig) -> Self {
        Self { log, config }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub async fn compact(
        &self,
        cache: &mut ContextCache,
    ) -> Result<CompactionOutcome, CompactionError> {
        let session = self.log.session_key();
        let tokens_before = cache.total_tokens();
        let target = self.config.target_tokens();
        debug!(session, phase = ?CompactionPhase::Evaluate, tokens_before, target);
        if tokens_before <= target {
            debug!(session, phase = ?CompactionPhase::Idle, "within budget");
            return Ok(CompactionOutcome::idle(tokens_before));
        }

        let victims = select_victims(cache, &self.config);
        debug!(session, phase = ?CompactionPhase::Evict, candidates = victims.len());
        if victims.is_empty() {
            info!(
                session,
                tokens_before, target, "over budget but nothing is evictable; keeping hot tail"
            );
            return Ok(CompactionOutcome::idle(tokens_before));
        }

        let persisted: HashSet<String> = self
            .log
            .read_all()
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        if let Some(missing) = victims
            .iter()
            .map(|&i| &cache.events[i])
            .find(|e| !persisted.contains(&e.id))
        {
            return Err(CompactionError::NotPersisted {
                event_id: missing.id.clone(),
            });
        }

        let manifest = build_manifest(victims.iter().map(|&i| &cache.events[i]));
        debug!(
            session,
            phase = ?CompactionPhase::Manifest,
            events = manifest.event_count,
            tokens = manifest.token_count
        );

        let content = serde_json::to_string(&manifest).map_err(EventLogError::from)?;
        let turn_id = cache.events.last().map_or(0, |e| e.turn_id);
        let marker = self
            .log
            .append(
                EventInput::new(turn_id, EventKind::CompactionMarker, content)
                    .with_tokens(manifest.estimated_tokens())
                    .with_tag(POINTER_COMPACTION_TAG)
                    .non_evictable(),
            )
            .await?;
        debug!(session, phase = ?CompactionPhase::Persist, marker = %marker.id);

        let evicted = take_victims(cache, &victims);
        cache
            .markers
            .push(CacheMarker::new(Some(marker.id.clone()), manifest.clone()));
        let merged = cache.merge_markers(self.config.marker_soft_cap);
        let tokens_after = cache.total_tokens();
        info!(
            session,
            evicted = evicted.len(),
            tokens_before,
            tokens_after,
            markers_merged = merged,
            "pointer compaction complete"
        );

        Ok(CompactionOutcome {
            evicted_count: evicted.len(),
            markers_created: 1,
            marker_event_id: Some(marker.id),
            summary: render_manifest(&manifest),
            manifest,
            tokens_before,
            tokens_after,
        })
    }
}
