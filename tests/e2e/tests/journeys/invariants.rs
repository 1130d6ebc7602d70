//! Cross-component invariants exercised end-to-end

use engram_core::gaps::{triage, GapKind, GapSignal, Severity};
use engram_core::{
    DecayEngine, MemoryCategory, MemoryDraft, MemoryKind, ProactivenessDial, RetrievalConfig,
    RetrievalOptions, RetrievalPipeline, ScheduledItemDraft,
};
use engram_e2e_tests::harness::TestDatabaseManager;
use engram_e2e_tests::mocks::MockLanguage;

/// Ingest-then-retrieve: a memory holding a unique token comes back
/// within the first k results on a lexical query for that token.
#[tokio::test]
async fn test_unique_token_round_trip() {
    let db = TestDatabaseManager::new_temp();
    db.seed_memory(
        "u1",
        "User's cat is named Zanzibar",
        MemoryCategory::Fact,
    );
    for index in 0..10 {
        db.seed_memory(
            "u1",
            &format!("Unrelated filler memory number {index}"),
            MemoryCategory::Fact,
        );
    }

    let pipeline = RetrievalPipeline::new(db.store.clone(), None, None, RetrievalConfig::full());
    let results = pipeline
        .retrieve(
            "Zanzibar",
            "u1",
            &RetrievalOptions {
                limit: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(results
        .iter()
        .any(|result| result.memory.content.contains("Zanzibar")));
}

/// Static-profile memories never decay; every computed prominence
/// stays inside the unit interval and falls with age.
#[test]
fn test_decay_invariants_over_store_rows() {
    let db = TestDatabaseManager::new_temp();
    let mut draft = MemoryDraft::new("u1", "User's birthday is March 3rd");
    draft.kind = MemoryKind::StaticProfile;
    let static_memory = db.store.add_memory(draft).unwrap();
    let regular = db.seed_memory("u1", "Ordinary fact", MemoryCategory::Fact);

    let engine = DecayEngine::new();
    let now_ms = regular.document_date;
    assert_eq!(engine.prominence(&static_memory, now_ms + 365 * 86_400_000), 1.0);

    let mut previous = f64::INFINITY;
    for days in [0, 1, 10, 100, 1000] {
        let p = engine.prominence(&regular, now_ms + days * 86_400_000);
        assert!((0.0..=1.0).contains(&p));
        assert!(p <= previous);
        previous = p;
    }
}

/// Gap-triage fail-safe: with non-empty signals and a dead language
/// provider, every verdict is not-actionable with zero confidence and
/// the output length matches the input.
#[tokio::test]
async fn test_triage_fail_safe_shape() {
    let signals: Vec<GapSignal> = (0..4)
        .map(|index| GapSignal {
            kind: GapKind::StaleGoal,
            severity: Severity::High,
            description: format!("signal {index}"),
            context: String::new(),
            source_id: None,
        })
        .collect();

    let language = MockLanguage::failing();
    let verdicts = triage(
        &language,
        &signals,
        ProactivenessDial::Eager,
        "neutral",
        1_000,
    )
    .await;
    assert_eq!(verdicts.len(), signals.len());
    assert!(verdicts
        .iter()
        .all(|verdict| !verdict.actionable && verdict.confidence == 0.0));
}

/// Consolidation idempotence: the second duplicate-consolidation pass
/// removes zero items.
#[test]
fn test_consolidation_idempotent() {
    let db = TestDatabaseManager::new_temp();
    for message in [
        "remember to water the plants tonight",
        "remember to water the plants tonight please",
        "remember to water the plants this evening tonight",
        "book a dentist appointment",
    ] {
        db.store
            .add_scheduled_item(ScheduledItemDraft::new("u1", message))
            .unwrap();
    }

    let first = db.store.consolidate_pending_items("u1", 0.8).unwrap();
    assert!(first >= 1);
    let second = db.store.consolidate_pending_items("u1", 0.8).unwrap();
    assert_eq!(second, 0);
}

/// Memories are never physically deleted: supersession and archival
/// leave rows behind, hidden from latest views.
#[test]
fn test_no_physical_deletes() {
    let db = TestDatabaseManager::new_temp();
    let memory = db.seed_memory("u1", "original fact", MemoryCategory::Fact);
    db.store
        .replace_memory(&memory.id, MemoryDraft::new("u1", "corrected fact"))
        .unwrap();

    let stats = db.store.stats().unwrap();
    assert_eq!(stats.total_memories, 2);
    assert_eq!(stats.latest_memories, 1);
    let superseded = db.store.get_memory(&memory.id).unwrap().unwrap();
    assert_eq!(superseded.kind, MemoryKind::Superseded);
    assert!(!superseded.is_latest);
}
