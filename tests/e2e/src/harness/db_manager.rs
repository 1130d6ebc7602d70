//! Test Database Manager
//!
//! Provides isolated store instances for testing: temporary databases
//! that are automatically cleaned up, with seeding helpers for the
//! common shapes (memories, goals, clusters).

use std::path::PathBuf;
use std::sync::Arc;

use engram_core::{
    ContentStore, Memory, MemoryCategory, MemoryDraft, RelationType, ScheduledItemDraft,
};
use tempfile::TempDir;

/// Manager for test databases
///
/// Creates an isolated store per test to prevent interference. The
/// database is deleted when the manager is dropped.
pub struct TestDatabaseManager {
    /// The store instance
    pub store: Arc<ContentStore>,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: TempDir,
    /// Path to the database file
    db_path: PathBuf,
}

impl Default for TestDatabaseManager {
    fn default() -> Self {
        Self::new_temp()
    }
}

impl TestDatabaseManager {
    /// Create a new test store in a temporary directory.
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_engram.db");
        let store = Arc::new(
            ContentStore::new(Some(db_path.clone())).expect("Failed to create test store"),
        );
        Self {
            store,
            _temp_dir: temp_dir,
            db_path,
        }
    }

    /// Directory usable as a reflection workspace.
    pub fn workspace_dir(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Get the database path.
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Number of latest memories across all users.
    pub fn latest_count(&self) -> i64 {
        self.store.stats().map(|s| s.latest_memories).unwrap_or(0)
    }

    // ========================================================================
    // SEEDING METHODS
    // ========================================================================

    /// Seed one memory with content and category.
    pub fn seed_memory(&self, user_id: &str, content: &str, category: MemoryCategory) -> Memory {
        self.store
            .add_memory(MemoryDraft::new(user_id, content).with_category(category))
            .expect("seed memory")
    }

    /// Seed a goal memory (goal-subsystem metadata convention).
    pub fn seed_goal(&self, user_id: &str, title: &str, due_date_ms: Option<i64>) -> Memory {
        let mut draft = MemoryDraft::new(user_id, title);
        let mut metadata = serde_json::json!({"isGoal": true, "status": "active"});
        if let Some(due) = due_date_ms {
            metadata["dueDate"] = serde_json::Value::from(due);
        }
        draft.metadata = metadata;
        self.store.add_memory(draft).expect("seed goal")
    }

    /// Seed one memory with an explicit document date (aged fixtures
    /// survive the decay pass in the band the test expects).
    pub fn seed_memory_at(
        &self,
        user_id: &str,
        content: &str,
        category: MemoryCategory,
        document_date_ms: i64,
    ) -> Memory {
        let mut draft = MemoryDraft::new(user_id, content).with_category(category);
        draft.document_date = Some(document_date_ms);
        self.store.add_memory(draft).expect("seed memory")
    }

    /// Seed a chain of memories linked head-to-tail by EXTENDS edges,
    /// returning their ids in chain order.
    pub fn seed_extends_chain(
        &self,
        user_id: &str,
        contents: &[&str],
        category: MemoryCategory,
    ) -> Vec<String> {
        let ids: Vec<String> = contents
            .iter()
            .map(|content| self.seed_memory(user_id, content, category).id)
            .collect();
        self.link_chain(&ids);
        ids
    }

    /// Like [`seed_extends_chain`](Self::seed_extends_chain), with an
    /// explicit document date for every member.
    pub fn seed_extends_chain_at(
        &self,
        user_id: &str,
        contents: &[&str],
        category: MemoryCategory,
        document_date_ms: i64,
    ) -> Vec<String> {
        let ids: Vec<String> = contents
            .iter()
            .map(|content| {
                self.seed_memory_at(user_id, content, category, document_date_ms)
                    .id
            })
            .collect();
        self.link_chain(&ids);
        ids
    }

    fn link_chain(&self, ids: &[String]) {
        for pair in ids.windows(2) {
            self.store
                .add_relation(&pair[0], &pair[1], RelationType::Extends, 0.9)
                .expect("seed relation");
        }
    }

    /// Push a set of memories into a prominence band.
    pub fn set_prominence(&self, ids: &[String], prominence: f64) {
        let updates: Vec<(String, f64)> =
            ids.iter().map(|id| (id.clone(), prominence)).collect();
        self.store.set_prominences(&updates).expect("set prominence");
    }

    /// Seed a due proactive follow-up item.
    pub fn seed_due_follow_up(&self, user_id: &str, message: &str, trigger_at: i64) -> String {
        let mut draft = ScheduledItemDraft::new(user_id, message);
        draft.source = engram_core::ItemSource::Agent;
        draft.item_type = "follow_up".to_string();
        draft.trigger_at = trigger_at;
        self.store.add_scheduled_item(draft).expect("seed item").id
    }
}
