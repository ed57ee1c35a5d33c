use super::index::{SearchIndex, format_ts, parse_ts};
use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::warn;

/// Search request. Every filter is optional; `limit` defaults to the
/// configured `default_limit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub session_id: Option<String>,
    pub event_types: Vec<String>,
    pub roles: Vec<String>,
    /// Exclusive lower bound on event timestamp.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on event timestamp.
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn after(mut self, ts: DateTime<Utc>) -> Self {
        self.after = Some(ts);
        self
    }

    pub fn before(mut self, ts: DateTime<Utc>) -> Self {
        self.before = Some(ts);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub event_id: String,
    pub session_id: String,
    pub event_type: String,
    pub role: Option<String>,
    pub tool_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Relevance (negated bm25); 0 for keyword-scan and listing results.
    pub score: f64,
}

type HitRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    f64,
);

const HIT_COLUMNS: &str =
    "e.event_id, e.session_id, e.event_type, e.role, e.tool_name, e.text_content, e.timestamp";

fn into_hit(row: HitRow) -> SearchHit {
    let (event_id, session_id, event_type, role, tool_name, text, timestamp, score) = row;
    SearchHit {
        event_id,
        session_id,
        event_type,
        role,
        tool_name,
        text,
        timestamp: parse_ts(&timestamp),
        score,
    }
}

/// FTS5 expression: each whitespace term quoted, OR-joined.
fn fts_expression(terms: &[&str]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Append the shared filter clauses. Both search paths go through here so
/// their filtering stays identical.
fn push_filters(query: &SearchQuery, conditions: &mut Vec<String>, binds: &mut Vec<String>) {
    if let Some(ref session) = query.session_id {
        conditions.push("e.session_id = ?".into());
        binds.push(session.clone());
    }
    if !query.event_types.is_empty() {
        let marks = vec!["?"; query.event_types.len()].join(", ");
        conditions.push(format!("e.event_type IN ({marks})"));
        binds.extend(query.event_types.iter().cloned());
    }
    if !query.roles.is_empty() {
        let marks = vec!["?"; query.roles.len()].join(", ");
        conditions.push(format!("e.role IN ({marks})"));
        binds.extend(query.roles.iter().cloned());
    }
    if let Some(after) = query.after {
        conditions.push("e.timestamp > ?".into());
        binds.push(format_ts(&after));
    }
    if let Some(before) = query.before {
        conditions.push("e.timestamp < ?".into());
        binds.push(format_ts(&before));
    }
}

impl SearchIndex {
    /// Ranked matches for `query`. An empty query matches nothing.
    pub async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<SearchHit>> {
        let terms: Vec<&str> = query.query.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let limit = query.limit.unwrap_or(self.config.default_limit).max(1);

        if self.full_text {
            match self.search_fts(&terms, query, limit).await {
                Ok(hits) => return Ok(hits),
                Err(e) => warn!(error = %e, "full-text query failed; using keyword scan"),
            }
        }
        self.search_keyword(&terms, query, limit).await
    }

    async fn search_fts(
        &self,
        terms: &[&str],
        query: &SearchQuery,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let mut conditions = vec!["trace_fts MATCH ?".to_string()];
        let mut binds = vec![fts_expression(terms)];
        push_filters(query, &mut conditions, &mut binds);
        let sql = format!(
            "SELECT {HIT_COLUMNS}, bm25(trace_fts) AS score
             FROM trace_fts JOIN trace_events e ON e.id = trace_fts.rowid
             WHERE {}
             ORDER BY score
             LIMIT {limit}",
            conditions.join(" AND ")
        );
        let mut q = sqlx::query_as::<_, HitRow>(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await.context("FTS5 search query")?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut hit = into_hit(row);
                hit.score = -hit.score;
                hit
            })
            .collect())
    }

    async fn search_keyword(
        &self,
        terms: &[&str],
        query: &SearchQuery,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let any_term = vec!["e.text_content LIKE ? ESCAPE '\\'"; terms.len()].join(" OR ");
        let mut conditions = vec![format!("({any_term})")];
        let mut binds: Vec<String> = terms.iter().map(|t| like_pattern(t)).collect();
        push_filters(query, &mut conditions, &mut binds);
        let sql = format!(
            "SELECT {HIT_COLUMNS}, 0.0 AS score
             FROM trace_events e
             WHERE {}
             ORDER BY e.timestamp DESC, e.id DESC
             LIMIT {limit}",
            conditions.join(" AND ")
        );
        let mut q = sqlx::query_as::<_, HitRow>(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await.context("keyword search query")?;
        Ok(rows.into_iter().map(into_hit).collect())
    }

    /// The `n` most recent events of a session, newest first.
    pub async fn get_recent(&self, session_id: &str, n: usize) -> anyhow::Result<Vec<SearchHit>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows: Vec<HitRow> = sqlx::query_as(&format!(
            "SELECT {HIT_COLUMNS}, 0.0 AS score FROM trace_events e
             WHERE e.session_id = ?1
             ORDER BY e.timestamp DESC, e.id DESC
             LIMIT ?2"
        ))
        .bind(session_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("recent events query")?;
        Ok(rows.into_iter().map(into_hit).collect())
    }

    /// Events around `around`, in chronological order: up to `ceil(w/2)` at
    /// or before it and up to `floor(w/2)` after it.
    pub async fn get_context(
        &self,
        session_id: &str,
        around: DateTime<Utc>,
        window: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let pivot = format_ts(&around);
        #[allow(clippy::cast_possible_wrap)]
        let (before_n, after_n) = (window.div_ceil(2) as i64, (window / 2) as i64);

        let before: Vec<HitRow> = sqlx::query_as(&format!(
            "SELECT {HIT_COLUMNS}, 0.0 AS score FROM trace_events e
             WHERE e.session_id = ?1 AND e.timestamp <= ?2
             ORDER BY e.timestamp DESC, e.id DESC
             LIMIT ?3"
        ))
        .bind(session_id)
        .bind(&pivot)
        .bind(before_n)
        .fetch_all(&self.pool)
        .await
        .context("context query (before)")?;

        let after: Vec<HitRow> = sqlx::query_as(&format!(
            "SELECT {HIT_COLUMNS}, 0.0 AS score FROM trace_events e
             WHERE e.session_id = ?1 AND e.timestamp > ?2
             ORDER BY e.timestamp ASC, e.id ASC
             LIMIT ?3"
        ))
        .bind(session_id)
        .bind(&pivot)
        .bind(after_n)
        .fetch_all(&self.pool)
        .await
        .context("context query (after)")?;

        Ok(before
            .into_iter()
            .rev()
            .chain(after)
            .map(into_hit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::eventlog::{Event, EventKind, EventLog, EventMetadata};
    use chrono::Duration;
    use tempfile::TempDir;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(n: i64, kind: EventKind, content: &str) -> Event {
        Event {
            id: format!("evt-{n:03}"),
            timestamp: base_time() + Duration::minutes(n),
            turn_id: u64::try_from(n).unwrap(),
            session_key: "s".into(),
            kind,
            content: content.into(),
            tokens: 10,
            metadata: EventMetadata::default(),
        }
    }

    async fn seeded(full_text: bool) -> (TempDir, SearchIndex) {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path(), "s");
        let other = EventLog::open(dir.path(), "other");
        let mut call = event(2, EventKind::ToolCall, r#"{"cmd":"cargo deploy"}"#);
        call.metadata.tool_name = Some("shell".into());
        for e in [
            event(0, EventKind::UserMessage, "please deploy the billing service"),
            event(1, EventKind::AgentMessage, "deploying billing now"),
            call,
            event(3, EventKind::ToolResult, "deploy finished with 100% success"),
            event(4, EventKind::UserMessage, "thanks, unrelated question about lunch"),
        ] {
            log.append_raw(&e).await.unwrap();
        }
        let mut foreign = event(5, EventKind::UserMessage, "deploy from another chat");
        foreign.session_key = "other".into();
        other.append_raw(&foreign).await.unwrap();

        let index = SearchIndex::in_memory(SearchConfig {
            full_text,
            ..SearchConfig::default()
        })
        .await
        .unwrap();
        assert_eq!(index.full_text(), full_text);
        index.index_session(&log).await.unwrap();
        index.index_session(&other).await.unwrap();
        (dir, index)
    }

    fn ids(hits: &[SearchHit]) -> Vec<String> {
        let mut ids: Vec<String> = hits.iter().map(|h| h.event_id.clone()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn fts_ranks_matches() {
        let (_dir, index) = seeded(true).await;
        let hits = index
            .search(&SearchQuery::new("billing").session("s"))
            .await
            .unwrap();
        assert_eq!(ids(&hits), vec!["evt-000", "evt-001"]);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[tokio::test]
    async fn filters_apply_identically_in_both_paths() {
        let queries = vec![
            SearchQuery::new("deploy"),
            SearchQuery::new("deploy").session("s"),
            SearchQuery::new("deploy").session("s").roles(["user"]),
            SearchQuery::new("deploy").event_types(["tool_call", "tool_result"]),
            SearchQuery::new("deploy")
                .session("s")
                .after(base_time())
                .before(base_time() + Duration::minutes(3)),
        ];
        let (_a, fts) = seeded(true).await;
        let (_b, keyword) = seeded(false).await;
        for q in queries {
            let left = fts.search(&q).await.unwrap();
            let right = keyword.search(&q).await.unwrap();
            assert_eq!(ids(&left), ids(&right), "query {q:?}");
        }
    }

    #[tokio::test]
    async fn time_bounds_are_exclusive() {
        let (_dir, index) = seeded(false).await;
        let hits = index
            .search(
                &SearchQuery::new("deploy")
                    .session("s")
                    .after(base_time())
                    .before(base_time() + Duration::minutes(3)),
            )
            .await
            .unwrap();
        assert_eq!(ids(&hits), vec!["evt-001", "evt-002"]);
    }

    #[tokio::test]
    async fn keyword_scan_orders_by_recency_and_escapes_wildcards() {
        let (_dir, index) = seeded(false).await;
        let hits = index
            .search(&SearchQuery::new("deploy").session("s"))
            .await
            .unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.event_id.as_str()).collect();
        assert_eq!(order, vec!["evt-003", "evt-002", "evt-001", "evt-000"]);

        let pct = index.search(&SearchQuery::new("100%")).await.unwrap();
        assert_eq!(ids(&pct), vec!["evt-003"]);
        assert!(index.search(&SearchQuery::new("   ")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_calls_are_findable_by_name() {
        let (_dir, index) = seeded(true).await;
        let hits = index.search(&SearchQuery::new("shell")).await.unwrap();
        assert_eq!(ids(&hits), vec!["evt-002"]);
        assert_eq!(hits[0].tool_name.as_deref(), Some("shell"));
        assert_eq!(hits[0].role.as_deref(), Some("assistant"));
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let (_dir, index) = seeded(true).await;
        let hits = index.search(&SearchQuery::new("deploy").limit(2)).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn recent_is_reverse_chronological() {
        let (_dir, index) = seeded(true).await;
        let recent = index.get_recent("s", 3).await.unwrap();
        let order: Vec<&str> = recent.iter().map(|h| h.event_id.as_str()).collect();
        assert_eq!(order, vec!["evt-004", "evt-003", "evt-002"]);
    }

    #[tokio::test]
    async fn context_straddles_the_pivot() {
        let (_dir, index) = seeded(true).await;
        let around = base_time() + Duration::minutes(2);
        let ctx = index.get_context("s", around, 4).await.unwrap();
        let order: Vec<&str> = ctx.iter().map(|h| h.event_id.as_str()).collect();
        assert_eq!(order, vec!["evt-001", "evt-002", "evt-003", "evt-004"]);

        let odd = index.get_context("s", around, 3).await.unwrap();
        let order: Vec<&str> = odd.iter().map(|h| h.event_id.as_str()).collect();
        assert_eq!(order, vec!["evt-001", "evt-002", "evt-003"]);
    }

    #[test]
    fn fts_expression_quotes_terms() {
        assert_eq!(fts_expression(&["a", "b\"c"]), "\"a\" OR \"b\"\"c\"");
    }
}
