use crate::compaction::{CompactionOutcome, ContextCache, PointerCompactor};
use crate::concept::{ConceptStore, EpisodicBuffer, EpisodicEntry, RecallHit, combined_query};
use crate::config::{Config, ReflectionConfig, RetrievalConfig};
use crate::error::{CompactionError, EventLogError};
use crate::eventlog::{Event, EventInput, EventKind, EventLog, EventLogRegistry};
use crate::process::{BackgroundQueue, ReportReceiver};
use crate::reflection::{
    CompactionReflection, CompactionReflector, PreCompactionState, ReflectionJournal, reflect_volume,
};
use super::retrieve::{format_retrieved, prompt_keywords};
use crate::search::{SearchHit, SearchIndex, SearchQuery, extract_text};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stores shared by every session in one workspace.
#[derive(Clone)]
pub struct MemoryStores {
    pub logs: Arc<EventLogRegistry>,
    pub search: Arc<SearchIndex>,
    pub concepts: Arc<ConceptStore>,
    pub journal: Arc<ReflectionJournal>,
    pub background: BackgroundQueue,
}

impl MemoryStores {
    /// Open (creating as needed) every store under the config's workspace.
    pub async fn open(config: &Config) -> anyhow::Result<(Self, ReportReceiver)> {
        let search = SearchIndex::open(&config.search_db_path(), config.search.clone()).await?;
        let (background, reports) = BackgroundQueue::new(config.background.max_concurrency);
        let stores = Self {
            logs: Arc::new(EventLogRegistry::new(config.sessions_dir())),
            search: Arc::new(search),
            concepts: Arc::new(ConceptStore::new(config.concept_dir(), config.concept.clone())),
            journal: Arc::new(ReflectionJournal::new(config.reflections_dir())),
            background,
        };
        Ok((stores, reports))
    }
}

/// One conversation's view of the memory substrate.
///
/// Appends are durable before they return. Compaction runs in the
/// foreground; indexing, volume reflection and the event-driven concept
/// rebuild it triggers run on the background queue, and their failures
/// surface as task reports instead of errors.
pub struct MemorySession {
    log: Arc<EventLog>,
    compactor: PointerCompactor,
    stores: MemoryStores,
    episodic: Mutex<EpisodicBuffer>,
    reflection: ReflectionConfig,
    retrieval: RetrievalConfig,
    tool_args_max_chars: usize,
}

impl MemorySession {
    pub fn new(log: Arc<EventLog>, stores: MemoryStores, episodic: EpisodicBuffer, config: &Config) -> Self {
        Self {
            compactor: PointerCompactor::new(Arc::clone(&log), config.compaction.clone()),
            log,
            stores,
            episodic: Mutex::new(episodic),
            reflection: config.reflection.clone(),
            retrieval: config.retrieval.clone(),
            tool_args_max_chars: config.search.tool_args_max_chars,
        }
    }

    /// Open `session_key` from the shared registry with a fresh episodic
    /// buffer.
    pub async fn open(session_key: &str, stores: MemoryStores, config: &Config) -> Self {
        let log = stores.logs.open(session_key).await;
        let episodic = EpisodicBuffer::new(&config.episodic, config.concept.default_importance);
        Self::new(log, stores, episodic, config)
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn session_key(&self) -> &str {
        self.log.session_key()
    }

    pub fn background(&self) -> &BackgroundQueue {
        &self.stores.background
    }

    /// Durably append, then remember the event in the episodic overlay.
    pub async fn append(&self, input: EventInput) -> Result<Event, EventLogError> {
        let event = self.log.append(input).await?;
        if event.kind != EventKind::CompactionMarker
            && let Some(text) = extract_text(&event, self.tool_args_max_chars)
        {
            let mut entry = EpisodicEntry::new(event.id.clone(), text, event.timestamp);
            entry.importance = event.metadata.importance;
            self.episodic.lock().await.add(entry);
        }
        Ok(event)
    }

    /// Compact `cache` now and queue the follow-up passes when anything
    /// was evicted.
    pub async fn compact(&self, cache: &mut ContextCache) -> Result<CompactionOutcome, CompactionError> {
        let outcome = self.compactor.compact(cache).await?;
        if outcome.evicted_count > 0 {
            self.schedule_followups(&outcome);
        }
        Ok(outcome)
    }

    fn schedule_followups(&self, outcome: &CompactionOutcome) {
        let queue = &self.stores.background;
        let session = self.session_key().to_string();

        let search = Arc::clone(&self.stores.search);
        let log = Arc::clone(&self.log);
        queue.spawn(format!("index:{session}"), async move {
            let indexed = search.index_session(&log).await?;
            Ok(format!("indexed {indexed} events"))
        });

        let journal = Arc::clone(&self.stores.journal);
        let (events, tokens) = (outcome.evicted_count, outcome.manifest.token_count);
        queue.spawn(format!("reflect-volume:{session}"), async move {
            let record = reflect_volume(events, tokens, Utc::now());
            journal.append(&record).await?;
            Ok(format!("volume severity {}", record.severity))
        });

        let concepts = Arc::clone(&self.stores.concepts);
        let log = Arc::clone(&self.log);
        let max_chars = self.tool_args_max_chars;
        queue.spawn(format!("concept-events:{session}"), async move {
            let report = concepts
                .rebuild_from_events(&[log], Utc::now(), max_chars, &CancellationToken::new())
                .await?;
            Ok(format!("{} new concept chunks", report.new_chunks))
        });
    }

    /// Grade a past compaction by the recalls made around it.
    pub async fn reflect(
        &self,
        marker_event_id: &str,
        pre: &PreCompactionState,
    ) -> Result<CompactionReflection, EventLogError> {
        CompactionReflector::new(Arc::clone(&self.log), self.reflection.clone())
            .with_journal(Arc::clone(&self.stores.journal))
            .reflect(marker_event_id, pre)
            .await
    }

    /// Episodic hits first, then concept hits, deduplicated.
    pub async fn recall(&self, query: &str, limit: usize) -> Vec<RecallHit> {
        let now = Utc::now();
        let index = self.stores.concepts.snapshot().await;
        let mut episodic = self.episodic.lock().await;
        episodic.expire(now);
        combined_query(&episodic, &index, query, limit, now)
    }

    pub async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<SearchHit>> {
        self.stores.search.search(query).await
    }

    /// Indexed history relevant to `prompt`, as one block ready to inject
    /// ahead of the turn.
    ///
    /// Searches every session in the index. Trivial prompts, prompts with no
    /// usable keywords and hits already present in `cache` yield nothing.
    pub async fn retrieve_for_prompt(
        &self,
        prompt: &str,
        cache: &ContextCache,
    ) -> anyhow::Result<Option<String>> {
        let config = &self.retrieval;
        if prompt.trim().chars().count() < config.min_prompt_chars {
            return Ok(None);
        }
        let keywords = prompt_keywords(prompt, config.max_keywords);
        if keywords.is_empty() {
            return Ok(None);
        }
        let query = SearchQuery::new(keywords.join(" ")).limit(config.max_results + cache.events.len());
        let hits: Vec<SearchHit> = self
            .stores
            .search
            .search(&query)
            .await?
            .into_iter()
            .filter(|hit| !cache.contains(&hit.event_id))
            .take(config.max_results)
            .collect();
        debug!(session = self.session_key(), keywords = ?keywords, hits = hits.len(), "per-turn retrieval");
        Ok(format_retrieved(&hits, config))
    }

    /// Bring the search index up to date with this session's log.
    pub async fn index_now(&self) -> anyhow::Result<usize> {
        self.stores.search.index_session(&self.log).await
    }
}
