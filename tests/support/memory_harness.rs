#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use tailmem::Config;
use tailmem::compaction::ContextCache;
use tailmem::eventlog::{Event, EventInput, EventKind, EventLog};
use tailmem::process::ReportReceiver;
use tailmem::{MemorySession, MemoryStores};

pub struct Fixture {
    pub tmp: TempDir,
    pub config: Config,
    pub stores: MemoryStores,
    pub reports: ReportReceiver,
}

/// Workspace in a temp dir with a small context window:
/// `ctx - headroom = 1800`, three hot-tail turns.
pub async fn fixture() -> Fixture {
    fixture_with(|config| {
        config.compaction.ctx_tokens = 2_000;
        config.compaction.headroom_tokens = 200;
        config.compaction.hot_tail_turns = 3;
    })
    .await
}

pub async fn fixture_with(tweak: impl FnOnce(&mut Config)) -> Fixture {
    let tmp = TempDir::new().expect("tempdir");
    let mut config = Config::for_workspace(tmp.path());
    tweak(&mut config);
    let (stores, reports) = MemoryStores::open(&config).await.expect("open stores");
    Fixture {
        tmp,
        config,
        stores,
        reports,
    }
}

impl Fixture {
    pub async fn session(&self, key: &str) -> MemorySession {
        MemorySession::open(key, self.stores.clone(), &self.config).await
    }
}

/// Append one 200-token tool result per turn and mirror it in a cache.
pub async fn fill_tool_results(session: &MemorySession, turns: u64) -> (ContextCache, Vec<Event>) {
    let mut cache = ContextCache::default();
    let mut events = Vec::new();
    for turn in 0..turns {
        let event = session
            .append(
                EventInput::new(
                    turn,
                    EventKind::ToolResult,
                    format!("build log for step {turn}: compiled crate shard-{turn} without warnings"),
                )
                .with_tool_name("cargo")
                .with_tag(format!("shard-{}", turn % 2))
                .with_tokens(200),
            )
            .await
            .expect("append");
        cache.push(event.clone());
        events.push(event);
    }
    (cache, events)
}

pub async fn append_recall(log: &Arc<EventLog>, turn: u64, result: &str) {
    log.append(EventInput::new(turn, EventKind::ToolCall, r#"{"query":"build log"}"#).with_tool_name("recall"))
        .await
        .expect("append recall call");
    log.append(EventInput::new(turn, EventKind::ToolResult, result).with_tool_name("recall"))
        .await
        .expect("append recall result");
}
