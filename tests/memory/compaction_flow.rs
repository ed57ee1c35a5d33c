use super::memory_harness::{fill_tool_results, fixture, fixture_with};
use std::collections::HashSet;
use tailmem::compaction::{CompactionManifest, ContextCache, POINTER_COMPACTION_TAG};
use tailmem::eventlog::{EventInput, EventKind, MetadataPatch};
use tailmem::search::SearchQuery;

#[tokio::test]
async fn twenty_tool_results_compact_to_one_marker() {
    let fx = fixture().await;
    let session = fx.session("build-agent").await;
    let (mut cache, events) = fill_tool_results(&session, 20).await;
    assert_eq!(cache.total_tokens(), 4_000);

    let outcome = session.compact(&mut cache).await.expect("compact");
    assert_eq!(outcome.markers_created, 1);
    assert_eq!(outcome.evicted_count, 11);
    assert_eq!(outcome.tokens_after, 1_800);
    assert_eq!(cache.total_tokens(), 1_800);

    let markers = session
        .log()
        .read_by_kind(&EventKind::CompactionMarker)
        .await
        .expect("read markers");
    assert_eq!(markers.len(), 1);
    assert!(markers[0].metadata.has_tag(POINTER_COMPACTION_TAG));
    assert!(markers[0].is_non_evictable());
    let manifest = CompactionManifest::parse_lenient(&markers[0].content).expect("manifest");
    assert_eq!(manifest.event_count, outcome.evicted_count);
    assert_eq!(manifest.token_count, 2_200);
    let range = manifest.event_id_range.expect("range");
    assert_eq!(range.first, events[0].id);
    assert_eq!(range.last, events[10].id);
    assert_eq!(manifest.topic_hints, ["shard-0", "shard-1"]);

    let turns: HashSet<u64> = cache.events.iter().map(|e| e.turn_id).collect();
    for hot in 17..20 {
        assert!(turns.contains(&hot), "hot-tail turn {hot} was evicted");
    }
}

#[tokio::test]
async fn evicted_events_stay_retrievable() {
    let fx = fixture().await;
    let session = fx.session("lossless").await;
    let (mut cache, events) = fill_tool_results(&session, 20).await;
    session.compact(&mut cache).await.expect("compact");
    session.background().wait_idle().await;

    let evicted: Vec<_> = events
        .iter()
        .filter(|e| !cache.contains(&e.id))
        .collect();
    assert_eq!(evicted.len(), 11);

    for event in &evicted {
        let stored = session
            .log()
            .read_by_id(&event.id)
            .await
            .expect("read")
            .expect("evicted event still in log");
        assert_eq!(stored.content, event.content);
    }

    let hits = session
        .search(
            &SearchQuery::new("compiled")
                .session("lossless")
                .event_types(["tool_result"])
                .limit(50),
        )
        .await
        .expect("search");
    let found: HashSet<_> = hits.iter().map(|h| h.event_id.as_str()).collect();
    for event in evicted {
        assert!(found.contains(event.id.as_str()), "evicted {} not searchable", event.id);
    }
}

#[tokio::test]
async fn compaction_within_budget_is_a_noop() {
    let fx = fixture().await;
    let session = fx.session("small").await;
    let (mut cache, _) = fill_tool_results(&session, 5).await;
    let before = cache.clone();

    let outcome = session.compact(&mut cache).await.expect("compact");
    assert_eq!(outcome.evicted_count, 0);
    assert_eq!(outcome.markers_created, 0);
    assert_eq!(cache, before);

    let again = session.compact(&mut cache).await.expect("compact");
    assert_eq!(again.evicted_count, 0);
    assert_eq!(session.log().count().await.expect("count"), 5);
}

#[tokio::test]
async fn second_pass_after_compaction_changes_nothing() {
    let fx = fixture().await;
    let session = fx.session("twice").await;
    let (mut cache, _) = fill_tool_results(&session, 20).await;
    session.compact(&mut cache).await.expect("first");
    let settled = cache.clone();
    let second = session.compact(&mut cache).await.expect("second");
    assert_eq!(second.evicted_count, 0);
    assert_eq!(cache, settled);
}

#[tokio::test]
async fn hot_tail_over_budget_evicts_what_it_can() {
    let fx = fixture_with(|c| {
        c.compaction.ctx_tokens = 600;
        c.compaction.headroom_tokens = 100;
        c.compaction.hot_tail_turns = 5;
    })
    .await;
    let session = fx.session("tight").await;
    let (mut cache, _) = fill_tool_results(&session, 6).await;

    let outcome = session.compact(&mut cache).await.expect("compact");
    assert_eq!(outcome.evicted_count, 1);
    assert_eq!(cache.total_tokens(), 1_000);
    assert!(cache.total_tokens() > fx.config.compaction.target_tokens());
}

#[tokio::test]
async fn constraints_and_demotions_shape_eviction() {
    let fx = fixture_with(|c| {
        c.compaction.ctx_tokens = 1_000;
        c.compaction.headroom_tokens = 0;
        c.compaction.hot_tail_turns = 1;
    })
    .await;
    let session = fx.session("policy").await;
    let mut cache = ContextCache::default();

    let pinned = session
        .append(EventInput::new(0, EventKind::UserMessage, "never deploy on fridays").with_tokens(300).non_evictable())
        .await
        .expect("append");
    let old = session
        .append(EventInput::new(1, EventKind::AgentMessage, "first draft of the plan").with_tokens(300))
        .await
        .expect("append");
    let newer = session
        .append(EventInput::new(2, EventKind::AgentMessage, "revised plan").with_tokens(300))
        .await
        .expect("append");
    let tail = session
        .append(EventInput::new(3, EventKind::UserMessage, "ship it").with_tokens(300))
        .await
        .expect("append");
    session
        .log()
        .update_metadata(&newer.id, MetadataPatch::superseded_by(&tail.id))
        .await
        .expect("patch");
    let mut demoted = newer.clone();
    MetadataPatch::superseded_by(&tail.id).apply(&mut demoted.metadata);
    for event in [pinned.clone(), old.clone(), demoted, tail.clone()] {
        cache.push(event);
    }

    let outcome = session.compact(&mut cache).await.expect("compact");
    assert_eq!(outcome.evicted_count, 1);
    assert!(!cache.contains(&newer.id), "superseded event should go first");
    assert!(cache.contains(&pinned.id));
    assert!(cache.contains(&old.id));
    assert!(cache.contains(&tail.id));
}
