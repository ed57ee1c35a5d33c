use super::memory_harness::{append_recall, fill_tool_results, fixture};
use tailmem::eventlog::EventKind;
use tailmem::reflection::{
    ActionTaken, CompactionReflection, PreCompactionState, REFLECTION_TAG, ReflectionJournal,
    ReflectionMode, Severity,
};

const RICH_RESULT: &str = "step 4 compiled crate shard-0 in 41s; artifacts uploaded to the build cache bucket";

#[tokio::test]
async fn five_misses_and_one_hit_grade_high() {
    let fx = fixture().await;
    let session = fx.session("reflect").await;
    let (mut cache, _) = fill_tool_results(&session, 20).await;
    let before = cache.total_tokens();
    let outcome = session.compact(&mut cache).await.expect("compact");
    let marker_id = outcome.marker_event_id.expect("marker");

    let marker_turn = 19;
    for _ in 0..5 {
        append_recall(session.log(), marker_turn, "no results").await;
    }
    append_recall(session.log(), marker_turn, RICH_RESULT).await;

    let pre = PreCompactionState {
        context_tokens: before,
        ..PreCompactionState::default()
    };
    let reflection = session.reflect(&marker_id, &pre).await.expect("reflect");
    assert_eq!(reflection.recall_attempts, 6);
    assert_eq!((reflection.hits, reflection.misses), (1, 5));
    assert!((reflection.miss_rate - 5.0 / 6.0).abs() < 1e-9);
    assert_eq!(reflection.severity, Severity::High);
    assert!(reflection.needs_human_review);
    assert_eq!(reflection.action_taken, ActionTaken::FlaggedForReview);
    assert_eq!(reflection.events_compacted, 11);
    assert_eq!(reflection.context_tokens_after, before - 2_200);
    assert!(reflection.diagnosis.contains("83% miss rate"));

    let notes = session
        .log()
        .read_by_kind(&EventKind::SystemNote)
        .await
        .expect("notes");
    let note = notes
        .iter()
        .find(|n| n.metadata.has_tag(REFLECTION_TAG))
        .expect("reflection note");
    let stored: CompactionReflection = serde_json::from_str(&note.content).expect("note json");
    assert_eq!(stored.marker_event_id, reflection.marker_event_id);
    assert_eq!(stored.severity, Severity::High);
    assert_eq!(stored.diagnosis, reflection.diagnosis);
    assert_eq!(stored.timestamp, reflection.timestamp);
}

#[tokio::test]
async fn journal_gets_both_modes_and_digests() {
    let fx = fixture().await;
    let session = fx.session("journal").await;
    let (mut cache, _) = fill_tool_results(&session, 20).await;
    let outcome = session.compact(&mut cache).await.expect("compact");
    session.background().wait_idle().await;

    append_recall(session.log(), 19, RICH_RESULT).await;
    let reflection = session
        .reflect(
            &outcome.marker_event_id.expect("marker"),
            &PreCompactionState::default(),
        )
        .await
        .expect("reflect");
    assert_eq!(reflection.severity, Severity::Low);

    let journal = ReflectionJournal::new(fx.config.reflections_dir());
    let day = reflection.timestamp.date_naive();
    let records = journal.read_day(day).await.expect("read journal");
    assert!(records.iter().any(|r| r.mode == ReflectionMode::Volume));
    assert!(records.iter().any(|r| r.mode == ReflectionMode::Retrieval));

    let digest = journal.digest(day).await.expect("digest");
    assert_eq!(digest.total, 2);
    assert_eq!(digest.low, 2);
    assert_eq!(digest.needs_review, 0);
    assert_eq!(digest.top_diagnoses.len(), 2);
}

#[tokio::test]
async fn false_positives_escalate_severity() {
    let fx = fixture().await;
    let session = fx.session("fp").await;
    let (mut cache, _) = fill_tool_results(&session, 20).await;
    let outcome = session.compact(&mut cache).await.expect("compact");
    let marker = outcome.marker_event_id.expect("marker");

    let mut last = Severity::Low;
    for round in 0..5 {
        append_recall(session.log(), 19, "step 2 built, see log").await;
        let r = session
            .reflect(&marker, &PreCompactionState::default())
            .await
            .expect("reflect");
        assert_eq!(r.false_positives, round + 1);
        assert!(r.severity >= last);
        last = r.severity;
    }
    assert_eq!(last, Severity::High);
}
