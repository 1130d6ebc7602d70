//! S4 - NREM fusion through the deep cycle
//!
//! Three dormant coffee memories linked by EXTENDS edges consolidate
//! into a single derived memory; the sources flip to superseded and
//! three DERIVES edges appear.

use std::sync::Arc;

use engram_core::{
    Gardener, GardenerConfig, LearnedFrom, MemoryCategory, MemoryKind, RelationType,
};
use engram_e2e_tests::harness::TestDatabaseManager;
use engram_e2e_tests::mocks::MockLanguage;

const FUSION_REPLY: &str =
    r#"{"summary":"User drinks dark roast coffee every morning","importance":7,"category":"preference"}"#;

#[tokio::test]
async fn test_deep_cycle_consolidates_dormant_cluster() {
    let db = TestDatabaseManager::new_temp();
    // Two-month-old memories: the deep tick's decay pass keeps them
    // inside the dormant fusion window instead of boosting them back up
    let aged = chrono::Utc::now().timestamp_millis() - 60 * 86_400_000;
    let ids = db.seed_extends_chain_at(
        "u1",
        &[
            "User likes coffee",
            "User drinks coffee every morning",
            "User prefers dark roast",
        ],
        MemoryCategory::Preference,
        aged,
    );
    db.set_prominence(&ids, 0.25);

    let gardener = Gardener::new(
        db.store.clone(),
        Some(Arc::new(MockLanguage::fixed(FUSION_REPLY))),
        None,
        None,
        GardenerConfig::default(),
    );
    let record = gardener
        .run_deep_tick(chrono::Utc::now().timestamp_millis())
        .await
        .unwrap();
    assert_eq!(record.clusters_fused, 1);

    // One derived memory remains latest, mentioning coffee
    let latest = db.store.latest_memories("u1").unwrap();
    assert_eq!(latest.len(), 1);
    let derived = &latest[0];
    assert!(derived.content.contains("coffee"));
    assert_eq!(derived.kind, MemoryKind::Derived);
    assert_eq!(derived.learned_from, Some(LearnedFrom::DaytimeFusion));
    assert!(derived.prominence <= 0.7);
    // Shorter than the sum of its sources
    let source_length: usize = [
        "User likes coffee",
        "User drinks coffee every morning",
        "User prefers dark roast",
    ]
    .iter()
    .map(|content| content.len())
    .sum();
    assert!(derived.content.len() < source_length);

    // All three originals superseded with DERIVES edges from the new one
    for id in &ids {
        let source = db.store.get_memory(id).unwrap().unwrap();
        assert!(!source.is_latest);
        assert_eq!(source.kind, MemoryKind::Superseded);
    }
    let derives: Vec<_> = db
        .store
        .relations_for(&derived.id)
        .unwrap()
        .into_iter()
        .filter(|relation| relation.relation_type == RelationType::Derives)
        .collect();
    assert_eq!(derives.len(), 3);
    assert!(derives.iter().all(|relation| relation.source_id == derived.id));
}

#[tokio::test]
async fn test_fusion_failure_leaves_sources_untouched() {
    let db = TestDatabaseManager::new_temp();
    // Two-month-old memories: the deep tick's decay pass keeps them
    // inside the dormant fusion window instead of boosting them back up
    let aged = chrono::Utc::now().timestamp_millis() - 60 * 86_400_000;
    let ids = db.seed_extends_chain_at(
        "u1",
        &[
            "User likes coffee",
            "User drinks coffee every morning",
            "User prefers dark roast",
        ],
        MemoryCategory::Preference,
        aged,
    );
    db.set_prominence(&ids, 0.25);

    let gardener = Gardener::new(
        db.store.clone(),
        Some(Arc::new(MockLanguage::fixed("not json"))),
        None,
        None,
        GardenerConfig::default(),
    );
    let record = gardener
        .run_deep_tick(chrono::Utc::now().timestamp_millis())
        .await
        .unwrap();
    assert_eq!(record.clusters_fused, 0);
    assert!(record.failures >= 1);
    assert_eq!(db.store.latest_memories("u1").unwrap().len(), 3);
}
