use super::extract::{extract_text, role_for};
use super::schema;
use crate::compaction::{CompactionManifest, POINTER_COMPACTION_TAG};
use crate::config::SearchConfig;
use crate::eventlog::{EventKind, EventLog, EventLogRegistry};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use tracing::{debug, info};

/// Fixed-width RFC 3339 so lexical order in SQLite is chronological.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

/// How far indexing has progressed through one session log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub byte_offset: u64,
    pub event_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredManifest {
    pub marker_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub manifest: CompactionManifest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub total_events: u64,
    pub sessions: u64,
    pub manifests: u64,
    pub full_text: bool,
}

/// Derived, rebuildable text index over session logs.
///
/// Indexing is incremental: each session keeps a byte-offset watermark and
/// only lines appended after it are read.
pub struct SearchIndex {
    pub(super) pool: SqlitePool,
    pub(super) full_text: bool,
    pub(super) config: SearchConfig,
}

impl SearchIndex {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &Path, config: SearchConfig) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create search index directory")?;
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .context("open search index database")?;
        Self::with_pool(pool, config).await
    }

    /// Open an in-memory index (useful for tests).
    pub async fn in_memory(config: SearchConfig) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory search index")?;
        Self::with_pool(pool, config).await
    }

    async fn with_pool(pool: SqlitePool, config: SearchConfig) -> anyhow::Result<Self> {
        let full_text = schema::init_schema(&pool, config.full_text).await?;
        Ok(Self {
            pool,
            full_text,
            config,
        })
    }

    /// Whether queries run against FTS5 (otherwise the keyword scan).
    pub fn full_text(&self) -> bool {
        self.full_text
    }

    #[allow(clippy::cast_sign_loss)]
    pub async fn watermark(&self, session_id: &str) -> anyhow::Result<Option<Watermark>> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT byte_offset, event_count FROM trace_watermarks WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("read watermark")?;
        Ok(row.map(|(offset, count)| Watermark {
            byte_offset: offset as u64,
            event_count: count as u64,
        }))
    }

    /// Index everything appended to `log` since the last run.
    ///
    /// Rows and the advanced watermark commit in one transaction. Returns the
    /// number of newly inserted rows; a second call with no new events
    /// returns 0.
    #[allow(clippy::cast_possible_wrap)]
    pub async fn index_session(&self, log: &EventLog) -> anyhow::Result<usize> {
        let session = log.session_key();
        let mark = self.watermark(session).await?.unwrap_or_default();
        let slice = log
            .read_since(mark.byte_offset)
            .await
            .context("read session log")?;
        if slice.events.is_empty() && slice.next_offset == mark.byte_offset {
            debug!(session, "index up to date");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("begin index transaction")?;
        let mut inserted = 0u64;
        for event in &slice.events {
            let Some(text) = extract_text(event, self.config.tool_args_max_chars) else {
                continue;
            };
            let result = sqlx::query(
                "INSERT OR IGNORE INTO trace_events
                    (event_id, session_id, event_type, role, tool_name, text_content, timestamp, turn_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&event.id)
            .bind(session)
            .bind(event.kind.as_str())
            .bind(role_for(&event.kind))
            .bind(event.tool_name())
            .bind(&text)
            .bind(format_ts(&event.timestamp))
            .bind(event.turn_id as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("index event {}", event.id))?;
            inserted += result.rows_affected();

            if event.kind == EventKind::CompactionMarker
                && event.metadata.has_tag(POINTER_COMPACTION_TAG)
                && let Some(manifest) = CompactionManifest::parse_lenient(&event.content)
            {
                sqlx::query(
                    "INSERT OR IGNORE INTO trace_manifests
                        (session_id, marker_event_id, manifest_json, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(session)
                .bind(&event.id)
                .bind(serde_json::to_string(&manifest)?)
                .bind(format_ts(&event.timestamp))
                .execute(&mut *tx)
                .await
                .context("record manifest")?;
            }
        }

        let restarted = slice.start_offset != mark.byte_offset;
        let event_count = if restarted { 0 } else { mark.event_count } + slice.events.len() as u64;
        sqlx::query(
            "INSERT INTO trace_watermarks (session_id, byte_offset, event_count, last_indexed)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                byte_offset = excluded.byte_offset,
                event_count = excluded.event_count,
                last_indexed = excluded.last_indexed",
        )
        .bind(session)
        .bind(slice.next_offset as i64)
        .bind(event_count as i64)
        .bind(format_ts(&Utc::now()))
        .execute(&mut *tx)
        .await
        .context("advance watermark")?;
        tx.commit().await.context("commit index transaction")?;

        #[allow(clippy::cast_possible_truncation)]
        let inserted = inserted as usize;
        info!(
            session,
            inserted,
            scanned = slice.events.len(),
            offset = slice.next_offset,
            "indexed session log"
        );
        Ok(inserted)
    }

    /// Index every session log the registry finds on disk. Returns each
    /// session key with its newly inserted row count.
    pub async fn index_all(&self, registry: &EventLogRegistry) -> anyhow::Result<Vec<(String, usize)>> {
        let logs = registry.open_all().await.context("list session logs")?;
        let mut counts = Vec::with_capacity(logs.len());
        for log in logs {
            let indexed = self.index_session(&log).await?;
            counts.push((log.session_key().to_string(), indexed));
        }
        Ok(counts)
    }

    /// Record a manifest directly, outside of log indexing.
    pub async fn store_manifest(
        &self,
        session_id: &str,
        marker_event_id: Option<&str>,
        manifest: &CompactionManifest,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO trace_manifests
                (session_id, marker_event_id, manifest_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(marker_event_id)
        .bind(serde_json::to_string(manifest)?)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .context("store manifest")?;
        Ok(())
    }

    /// Most recent manifests for a session, newest first. Rows that no longer
    /// parse are skipped.
    pub async fn get_manifests(
        &self,
        session_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredManifest>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows: Vec<(Option<String>, String, String)> = sqlx::query_as(
            "SELECT marker_event_id, created_at, manifest_json FROM trace_manifests
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("list manifests")?;

        Ok(rows
            .into_iter()
            .filter_map(|(marker_event_id, created_at, json)| {
                let manifest = CompactionManifest::parse_lenient(&json)?;
                Some(StoredManifest {
                    marker_event_id,
                    created_at: parse_ts(&created_at),
                    manifest,
                })
            })
            .collect())
    }

    #[allow(clippy::cast_sign_loss)]
    pub async fn get_stats(&self) -> anyhow::Result<IndexStats> {
        let (total, sessions): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT session_id) FROM trace_events")
                .fetch_one(&self.pool)
                .await
                .context("count indexed events")?;
        let (manifests,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trace_manifests")
            .fetch_one(&self.pool)
            .await
            .context("count manifests")?;
        Ok(IndexStats {
            total_events: total as u64,
            sessions: sessions as u64,
            manifests: manifests as u64,
            full_text: self.full_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::EventIdRange;
    use crate::eventlog::EventInput;
    use tempfile::TempDir;

    #[tokio::test]
    async fn second_run_indexes_nothing() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path(), "s");
        log.append(EventInput::new(0, EventKind::UserMessage, "deploy the api"))
            .await
            .unwrap();
        log.append(EventInput::new(0, EventKind::AgentMessage, "   "))
            .await
            .unwrap();

        let index = SearchIndex::in_memory(SearchConfig::default()).await.unwrap();
        assert_eq!(index.index_session(&log).await.unwrap(), 1);
        assert_eq!(index.index_session(&log).await.unwrap(), 0);

        let mark = index.watermark("s").await.unwrap().unwrap();
        assert_eq!(mark.event_count, 2);
        assert_eq!(mark.byte_offset, std::fs::metadata(log.path()).unwrap().len());

        log.append(EventInput::new(1, EventKind::UserMessage, "and the worker"))
            .await
            .unwrap();
        assert_eq!(index.index_session(&log).await.unwrap(), 1);
        assert_eq!(index.watermark("s").await.unwrap().unwrap().event_count, 3);
    }

    #[tokio::test]
    async fn malformed_line_does_not_abort_indexing() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path(), "s");
        log.append(EventInput::new(0, EventKind::UserMessage, "first entry"))
            .await
            .unwrap();
        let mut raw = std::fs::read(log.path()).unwrap();
        raw.extend_from_slice(b"garbage line\n");
        std::fs::write(log.path(), raw).unwrap();
        log.append(EventInput::new(1, EventKind::UserMessage, "second entry"))
            .await
            .unwrap();

        let index = SearchIndex::in_memory(SearchConfig::default()).await.unwrap();
        assert_eq!(index.index_session(&log).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn markers_are_recorded_as_manifests() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path(), "s");
        let manifest = CompactionManifest {
            event_id_range: Some(EventIdRange {
                first: "a".into(),
                last: "b".into(),
            }),
            event_count: 2,
            token_count: 10,
            ..CompactionManifest::default()
        };
        let marker = log
            .append(
                EventInput::new(3, EventKind::CompactionMarker, serde_json::to_string(&manifest).unwrap())
                    .with_tag(POINTER_COMPACTION_TAG),
            )
            .await
            .unwrap();

        let index = SearchIndex::in_memory(SearchConfig::default()).await.unwrap();
        index.index_session(&log).await.unwrap();
        index.store_manifest("other", None, &CompactionManifest::default()).await.unwrap();

        let stored = index.get_manifests("s", 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].marker_event_id.as_deref(), Some(marker.id.as_str()));
        assert_eq!(stored[0].manifest, manifest);

        let stats = index.get_stats().await.unwrap();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.manifests, 2);
        assert!(stats.full_text);
    }

    #[tokio::test]
    async fn file_backed_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path().join("sessions"), "s");
        log.append(EventInput::new(0, EventKind::UserMessage, "persisted row"))
            .await
            .unwrap();
        let db = dir.path().join("search").join("index.db");
        {
            let index = SearchIndex::open(&db, SearchConfig::default()).await.unwrap();
            assert_eq!(index.index_session(&log).await.unwrap(), 1);
            index.pool.close().await;
        }
        let reopened = SearchIndex::open(&db, SearchConfig::default()).await.unwrap();
        assert_eq!(reopened.index_session(&log).await.unwrap(), 0);
        assert_eq!(reopened.get_stats().await.unwrap().total_events, 1);
    }

    #[test]
    fn timestamps_format_fixed_width() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_ts(&ts), "2024-05-01T10:00:00.000000Z");
        assert_eq!(parse_ts(&format_ts(&ts)), ts);
        assert_eq!(parse_ts("nonsense"), DateTime::<Utc>::default());
    }
}
