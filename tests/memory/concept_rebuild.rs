use super::memory_harness::fixture;
use tailmem::concept::{ConceptStore, RecallHit};
use tailmem::eventlog::{EventInput, EventKind};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn fs_rebuild_is_idempotent_and_tracks_edits() {
    let fx = fixture().await;
    let notes = fx.tmp.path().join("notes");
    std::fs::create_dir_all(notes.join("runbooks")).expect("mkdir");
    std::fs::write(
        notes.join("runbooks/redis.md"),
        "redis failover runbook: promote the replica, then repoint sentinel",
    )
    .expect("write");
    std::fs::write(notes.join("postgres.txt"), "postgres vacuum schedule and bloat checks").expect("write");

    let store = ConceptStore::new(fx.config.concept_dir(), fx.config.concept.clone());
    let cancel = CancellationToken::new();

    let first = store.rebuild_from_fs(&notes, &cancel).await.expect("first");
    assert_eq!(first.new_chunks, 2);
    let second = store.rebuild_from_fs(&notes, &cancel).await.expect("second");
    assert_eq!(second.new_chunks, 0);
    assert_eq!(second.reindexed, 0);

    // Force an mtime change the filesystem will notice.
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(
        notes.join("postgres.txt"),
        "postgres replication lag alerts and vacuum schedule",
    )
    .expect("rewrite");
    let third = store.rebuild_from_fs(&notes, &cancel).await.expect("third");
    assert_eq!(third.reindexed, 1);
    assert_eq!(store.snapshot().await.chunk_count(), 2);

    let hits = store.search("postgres replication", 5).await;
    assert!(hits[0].chunk.preview.contains("replication"));
}

#[tokio::test]
async fn session_recall_merges_episodic_and_concepts() {
    let fx = fixture().await;
    let session = fx.session("recall").await;
    let event = session
        .append(EventInput::new(0, EventKind::UserMessage, "grafana alert for disk pressure on node-3").with_importance(8))
        .await
        .expect("append");

    let report = fx
        .stores
        .concepts
        .rebuild_from_events(
            &[session.log().clone()],
            chrono::Utc::now(),
            fx.config.search.tool_args_max_chars,
            &CancellationToken::new(),
        )
        .await
        .expect("rebuild");
    assert_eq!(report.new_chunks, 1);

    let hits = session.recall("disk pressure grafana", 10).await;
    assert_eq!(hits.len(), 1, "event must appear once across both layers");
    assert!(matches!(hits[0], RecallHit::Episodic { .. }));
    assert_eq!(hits[0].dedup_key(), event.id);
}
