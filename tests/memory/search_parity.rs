use std::sync::Arc;
use tailmem::config::SearchConfig;
use tailmem::eventlog::{EventInput, EventKind, EventLog, EventLogRegistry};
use tailmem::search::{SearchIndex, SearchQuery};
use tempfile::TempDir;

async fn seeded_log(tmp: &TempDir) -> Arc<EventLog> {
    let log = Arc::new(EventLog::open(tmp.path().join("sessions"), "ops"));
    let inputs = [
        EventInput::new(0, EventKind::UserMessage, "why is the payments queue backing up"),
        EventInput::new(1, EventKind::ToolCall, r#"{"cmd":"kubectl get pods -n payments"}"#).with_tool_name("shell"),
        EventInput::new(1, EventKind::ToolResult, "payments-worker-7 CrashLoopBackOff").with_tool_name("shell"),
        EventInput::new(2, EventKind::AgentMessage, "the payments worker is crash looping on a bad config"),
        EventInput::new(3, EventKind::UserMessage, "roll back the config map"),
    ];
    for input in inputs {
        log.append(input).await.expect("append");
    }
    log
}

async fn index_pair(log: &EventLog) -> (SearchIndex, SearchIndex) {
    let fts = SearchIndex::in_memory(SearchConfig::default()).await.expect("fts index");
    let scan = SearchIndex::in_memory(SearchConfig {
        full_text: false,
        ..SearchConfig::default()
    })
    .await
    .expect("scan index");
    assert!(fts.full_text());
    assert!(!scan.full_text());
    fts.index_session(log).await.expect("index fts");
    scan.index_session(log).await.expect("index scan");
    (fts, scan)
}

fn ids(hits: &[tailmem::search::SearchHit]) -> Vec<String> {
    let mut ids: Vec<_> = hits.iter().map(|h| h.event_id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn both_paths_agree_on_filtered_membership() {
    let tmp = TempDir::new().expect("tempdir");
    let log = seeded_log(&tmp).await;
    let (fts, scan) = index_pair(&log).await;

    let queries = [
        SearchQuery::new("payments"),
        SearchQuery::new("payments").roles(["user"]),
        SearchQuery::new("payments").event_types(["tool_result", "tool_call"]),
        SearchQuery::new("config").session("ops"),
        SearchQuery::new("config").session("elsewhere"),
    ];
    for query in &queries {
        let a = fts.search(query).await.expect("fts search");
        let b = scan.search(query).await.expect("scan search");
        assert_eq!(ids(&a), ids(&b), "paths disagree for {query:?}");
    }
}

#[tokio::test]
async fn reindexing_is_idempotent_and_incremental() {
    let tmp = TempDir::new().expect("tempdir");
    let log = seeded_log(&tmp).await;
    let index = SearchIndex::in_memory(SearchConfig::default()).await.expect("index");

    assert_eq!(index.index_session(&log).await.expect("first"), 5);
    assert_eq!(index.index_session(&log).await.expect("second"), 0);

    log.append(EventInput::new(4, EventKind::AgentMessage, "config map rolled back"))
        .await
        .expect("append");
    assert_eq!(index.index_session(&log).await.expect("third"), 1);

    let stats = index.get_stats().await.expect("stats");
    assert_eq!(stats.total_events, 6);
    assert_eq!(stats.sessions, 1);
    let watermark = index.watermark("ops").await.expect("watermark").expect("present");
    assert_eq!(watermark.event_count, 6);
}

#[tokio::test]
async fn recent_lists_newest_first() {
    let tmp = TempDir::new().expect("tempdir");
    let log = seeded_log(&tmp).await;
    let index = SearchIndex::in_memory(SearchConfig::default()).await.expect("index");
    index.index_session(&log).await.expect("index");

    let recent = index.get_recent("ops", 2).await.expect("recent");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].text, "roll back the config map");
    assert!(recent[0].timestamp >= recent[1].timestamp);
}

#[tokio::test]
async fn workspace_pass_reuses_real_session_keys() {
    let tmp = TempDir::new().expect("tempdir");
    let registry = EventLogRegistry::new(tmp.path().join("sessions"));
    let log = registry.open("chat:1").await;
    log.append(EventInput::new(0, EventKind::UserMessage, "the zebra crossing camera is offline"))
        .await
        .expect("append");
    let index = SearchIndex::in_memory(SearchConfig::default()).await.expect("index");
    assert_eq!(index.index_session(&log).await.expect("session pass"), 1);

    let counts = index.index_all(&registry).await.expect("workspace pass");
    assert_eq!(counts, vec![("chat:1".to_string(), 0)]);

    let hits = index.search(&SearchQuery::new("zebra")).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].session_id, "chat:1");
    assert_eq!(index.get_stats().await.expect("stats").sessions, 1);
}
