//! Board state round-trips and the goal bridge
//!
//! Every column reachable through the move table projects onto the
//! documented status, and completing a goal-linked item propagates
//! progress up the EXTENDS chain.

use engram_core::{Board, BoardColumn, RelationType, ScheduledItemDraft};
use engram_e2e_tests::harness::TestDatabaseManager;

#[test]
fn test_explicit_column_round_trips() {
    let db = TestDatabaseManager::new_temp();
    let board = Board::new(db.store.clone());

    for column in BoardColumn::ALL {
        let mut draft = ScheduledItemDraft::new("u1", format!("item for {column}"));
        draft.board_status = Some(column);
        let item = board.create_item(draft).unwrap();
        let fetched = db.store.get_scheduled_item(&item.id).unwrap().unwrap();
        assert_eq!(fetched.board_status, column);
        assert_eq!(fetched.status, column.projected_status());
    }
}

#[test]
fn test_every_move_matches_projection_table() {
    let db = TestDatabaseManager::new_temp();
    let board = Board::new(db.store.clone());
    let item = board
        .create_item(ScheduledItemDraft::new("u1", "movable item"))
        .unwrap();

    for column in BoardColumn::ALL {
        board.move_item(&item.id, column, 1_000).unwrap();
        let fetched = db.store.get_scheduled_item(&item.id).unwrap().unwrap();
        assert_eq!(fetched.board_status, column);
        assert_eq!(fetched.status, column.projected_status());
    }
}

#[test]
fn test_goal_bridge_progress_walks_the_chain() {
    let db = TestDatabaseManager::new_temp();
    let board = Board::new(db.store.clone());

    // root <- mid (EXTENDS) <- two leaves (EXTENDS)
    let root = db.seed_goal("u1", "Become a polyglot programmer", None);
    let mid = db.seed_goal("u1", "Master systems languages", None);
    let leaf_a = db.seed_goal("u1", "Learn Rust", None);
    let leaf_b = db.seed_goal("u1", "Learn Zig", None);
    db.store
        .add_relation(&mid.id, &root.id, RelationType::Extends, 1.0)
        .unwrap();
    db.store
        .add_relation(&leaf_a.id, &mid.id, RelationType::Extends, 1.0)
        .unwrap();
    db.store
        .add_relation(&leaf_b.id, &mid.id, RelationType::Extends, 1.0)
        .unwrap();

    let mut draft = ScheduledItemDraft::new("u1", "finish the Rust book");
    draft.goal_id = Some(leaf_a.id.clone());
    let item = board.create_item(draft).unwrap();
    board.move_item(&item.id, BoardColumn::Done, 1_000).unwrap();

    // The leaf completed; the middle goal is half done
    let leaf = db.store.get_memory(&leaf_a.id).unwrap().unwrap();
    assert_eq!(leaf.meta_str("status"), Some("completed"));
    let mid = db.store.get_memory(&mid.id).unwrap().unwrap();
    assert_eq!(mid.meta_i64("progress"), Some(50));

    // Completing the second leaf finishes the middle goal and pushes
    // progress to the root
    let mut draft = ScheduledItemDraft::new("u1", "ship a Zig project");
    draft.goal_id = Some(leaf_b.id.clone());
    let item = board.create_item(draft).unwrap();
    board.move_item(&item.id, BoardColumn::Done, 2_000).unwrap();

    let mid = db.store.get_memory(&mid.id).unwrap().unwrap();
    assert_eq!(mid.meta_i64("progress"), Some(100));
    assert_eq!(mid.meta_str("status"), Some("completed"));
    let root = db.store.get_memory(&root.id).unwrap().unwrap();
    assert_eq!(root.meta_i64("progress"), Some(100));
}
