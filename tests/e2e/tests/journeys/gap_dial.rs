//! S5 - Gap pipeline respects the proactiveness dial
//!
//! A goal stale for 15 days yields a medium-severity signal. A
//! conservative dial schedules nothing; moderate schedules one
//! follow-up referencing the goal.

use std::sync::Arc;

use engram_core::{
    BehavioralPatterns, Gardener, GardenerConfig, ItemSource, ProactivenessDial,
};
use engram_e2e_tests::harness::TestDatabaseManager;
use engram_e2e_tests::mocks::MockLanguage;

const TRIAGE_REPLY: &str = r#"[{"index": 0, "actionable": true, "confidence": 0.5,
    "diagnosis": "the goal went quiet", "suggestedAction": "Ask how the Rust learning is going"}]"#;

fn set_dial(db: &TestDatabaseManager, dial: ProactivenessDial) {
    let mut patterns = db
        .store
        .get_patterns("u1")
        .unwrap()
        .unwrap_or_else(|| BehavioralPatterns::new("u1"));
    patterns.preferences.proactiveness_dial = dial;
    db.store.put_patterns(&patterns).unwrap();
}

fn follow_ups(db: &TestDatabaseManager) -> Vec<engram_core::ScheduledItem> {
    db.store
        .list_scheduled_items("u1", None)
        .unwrap()
        .into_iter()
        .filter(|item| item.item_type == "follow_up")
        .collect()
}

#[tokio::test]
async fn test_conservative_blocks_then_moderate_schedules() {
    let db = TestDatabaseManager::new_temp();
    db.seed_goal("u1", "Learn Rust", None);
    // The goal was last touched "15 days ago" relative to the tick
    let now_ms = chrono::Utc::now().timestamp_millis() + 15 * 86_400_000;

    let gardener = Gardener::new(
        db.store.clone(),
        Some(Arc::new(MockLanguage::fixed(TRIAGE_REPLY))),
        None,
        None,
        GardenerConfig::default(),
    );

    // Conservative: a medium-severity stale-goal diagnosis is dropped
    set_dial(&db, ProactivenessDial::Conservative);
    gardener.run_deep_tick(now_ms).await.unwrap();
    assert!(follow_ups(&db).is_empty());

    // Moderate: the same diagnosis becomes one scheduled follow-up
    set_dial(&db, ProactivenessDial::Moderate);
    gardener.run_deep_tick(now_ms).await.unwrap();
    let items = follow_ups(&db);
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert!(item.message.contains("Rust"));
    assert_eq!(item.source, ItemSource::Agent);
    let context = item.context.as_ref().unwrap();
    assert_eq!(context["gapType"], "stale_goal");
    assert!(context["sourceId"].is_string());
}

#[tokio::test]
async fn test_repeat_ticks_do_not_stack_reminders() {
    let db = TestDatabaseManager::new_temp();
    db.seed_goal("u1", "Learn Rust", None);
    let now_ms = chrono::Utc::now().timestamp_millis() + 15 * 86_400_000;
    set_dial(&db, ProactivenessDial::Moderate);

    let gardener = Gardener::new(
        db.store.clone(),
        Some(Arc::new(MockLanguage::fixed(TRIAGE_REPLY))),
        None,
        None,
        GardenerConfig::default(),
    );
    gardener.run_deep_tick(now_ms).await.unwrap();
    gardener.run_deep_tick(now_ms + 60_000).await.unwrap();

    // Word-overlap dedup suppresses the near-identical second reminder
    // as long as the first is still pending
    let pending: Vec<_> = follow_ups(&db)
        .into_iter()
        .filter(|item| item.status == engram_core::ItemStatus::Pending)
        .collect();
    assert!(pending.len() <= 1);
}
