//! S6 - Scheduler firing and engagement tracking
//!
//! A past-due agent follow-up fires exactly once through the channel
//! (pending -> processing -> fired), then a user message inside the
//! engagement window flips it to acted.

use std::sync::Arc;

use engram_core::{
    EngagementConfig, EngagementTracker, ItemStatus, Scheduler, SchedulerConfig,
};
use engram_e2e_tests::harness::TestDatabaseManager;
use engram_e2e_tests::mocks::{RecordingChannel, StubRunner};

/// Noon UTC on a fixed day, outside default quiet hours.
const NOON: i64 = 1_750_000_000_000 - (1_750_000_000_000 % 86_400_000) + 12 * 3_600_000;

#[tokio::test]
async fn test_fire_then_engage() {
    let db = TestDatabaseManager::new_temp();
    let item_id = db.seed_due_follow_up("u1", "How is the apartment hunt going?", NOON - 5_000);

    let channel = Arc::new(RecordingChannel::new());
    let scheduler = Scheduler::new(
        db.store.clone(),
        Some(channel.clone()),
        None,
        SchedulerConfig::default(),
    );

    let report = scheduler.evaluate(NOON).await.unwrap();
    assert_eq!(report.fired, 1);

    // Exactly one delivery through the channel
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "u1");
    assert!(sent[0].1.contains("apartment hunt"));

    let fired = db.store.get_scheduled_item(&item_id).unwrap().unwrap();
    assert_eq!(fired.status, ItemStatus::Fired);
    assert_eq!(fired.fired_at, Some(NOON));

    // Re-evaluating does not double-fire
    scheduler.evaluate(NOON + 60_000).await.unwrap();
    assert_eq!(channel.sent().len(), 1);

    // The user replies within the engagement window
    let tracker = EngagementTracker::new(db.store.clone(), EngagementConfig::default());
    let flipped = tracker
        .note_user_activity("u1", NOON + 3_600_000)
        .unwrap();
    assert_eq!(flipped, 1);
    let acted = db.store.get_scheduled_item(&item_id).unwrap().unwrap();
    assert_eq!(acted.status, ItemStatus::Acted);
}

#[tokio::test]
async fn test_reply_outside_window_changes_nothing() {
    let db = TestDatabaseManager::new_temp();
    let item_id = db.seed_due_follow_up("u1", "check in", NOON - 5_000);
    let channel = Arc::new(RecordingChannel::new());
    let scheduler = Scheduler::new(
        db.store.clone(),
        Some(channel),
        None,
        SchedulerConfig::default(),
    );
    scheduler.evaluate(NOON).await.unwrap();

    let tracker = EngagementTracker::new(db.store.clone(), EngagementConfig::default());
    // Two days later: well past the 24h window
    let flipped = tracker
        .note_user_activity("u1", NOON + 2 * 86_400_000)
        .unwrap();
    assert_eq!(flipped, 0);
    assert_eq!(
        db.store.get_scheduled_item(&item_id).unwrap().unwrap().status,
        ItemStatus::Fired
    );
}

#[tokio::test]
async fn test_task_kind_runs_through_skill_runner() {
    let db = TestDatabaseManager::new_temp();
    let mut draft = engram_core::ScheduledItemDraft::new("u1", "summarize the week");
    draft.kind = engram_core::ItemKind::Task;
    draft.trigger_at = NOON - 5_000;
    let item = db.store.add_scheduled_item(draft).unwrap();

    let channel = Arc::new(RecordingChannel::new());
    let scheduler = Scheduler::new(
        db.store.clone(),
        Some(channel.clone()),
        Some(Arc::new(StubRunner)),
        SchedulerConfig::default(),
    );
    let report = scheduler.evaluate(NOON).await.unwrap();
    assert_eq!(report.fired, 1);

    let finished = db.store.get_scheduled_item(&item.id).unwrap().unwrap();
    assert_eq!(finished.status, ItemStatus::Fired);
    assert!(finished.result.is_some());
    assert_eq!(finished.completed_at, Some(NOON));
    // The result also went out through the channel
    assert!(channel.sent()[0].1.contains("completed: summarize the week"));
}

#[tokio::test]
async fn test_undeliverable_items_retry_until_channel_returns() {
    let db = TestDatabaseManager::new_temp();
    let item_id = db.seed_due_follow_up("u1", "retry me", NOON - 5_000);

    let dead_channel = Arc::new(RecordingChannel::failing());
    let scheduler = Scheduler::new(
        db.store.clone(),
        Some(dead_channel),
        None,
        SchedulerConfig::default(),
    );
    scheduler.evaluate(NOON).await.unwrap();
    assert_eq!(
        db.store.get_scheduled_item(&item_id).unwrap().unwrap().status,
        ItemStatus::Pending
    );

    // Channel recovers; the next sweep delivers
    let live_channel = Arc::new(RecordingChannel::new());
    let scheduler = Scheduler::new(
        db.store.clone(),
        Some(live_channel.clone()),
        None,
        SchedulerConfig::default(),
    );
    scheduler.evaluate(NOON + 60_000).await.unwrap();
    assert_eq!(live_channel.sent().len(), 1);
    assert_eq!(
        db.store.get_scheduled_item(&item_id).unwrap().unwrap().status,
        ItemStatus::Fired
    );
}
