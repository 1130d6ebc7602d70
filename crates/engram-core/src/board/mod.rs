//! Board and Scheduler
//!
//! The kanban board is a view over scheduled items; column moves project
//! onto the underlying status machine. The scheduler sweeps due items on
//! a timer, and engagement tracking turns user replies into trust.

mod engagement;
mod scheduler;

pub use engagement::{EngagementConfig, EngagementTracker};
pub use scheduler::{
    is_quiet_hours, plan_delivery_time, Scheduler, SchedulerConfig, SweepReport,
};

use std::sync::Arc;

use crate::error::Result;
use crate::memory::{BoardColumn, Memory, RelationType, ScheduledItem, ScheduledItemDraft};
use crate::storage::ContentStore;

/// Goal-chain walks stop after this many levels
const MAX_GOAL_DEPTH: usize = 10;

/// Kanban view over scheduled items
pub struct Board {
    store: Arc<ContentStore>,
}

impl Board {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }

    /// Create an item; the default-column rule applies when no column
    /// is given explicitly.
    pub fn create_item(&self, draft: ScheduledItemDraft) -> Result<ScheduledItem> {
        Ok(self.store.add_scheduled_item(draft)?)
    }

    /// Items in one column for a user.
    pub fn column(&self, user_id: &str, column: BoardColumn) -> Result<Vec<ScheduledItem>> {
        let items = self.store.list_scheduled_items(user_id, None)?;
        Ok(items
            .into_iter()
            .filter(|item| item.board_status == column)
            .collect())
    }

    /// Move an item to a column. The underlying status follows the
    /// projection table; marking a goal-linked item done also completes
    /// the goal and recomputes parent progress up the EXTENDS chain.
    pub fn move_item(
        &self,
        item_id: &str,
        column: BoardColumn,
        now_ms: i64,
    ) -> Result<ScheduledItem> {
        let item = self.store.move_item_to_column(item_id, column, now_ms)?;
        if column == BoardColumn::Done {
            if let Some(goal_id) = item.goal_id.clone() {
                if let Err(error) = self.complete_goal(&goal_id) {
                    tracing::warn!("goal bridge failed for {goal_id}: {error}");
                }
            }
        }
        Ok(item)
    }

    /// Goal bridge: flip the linked goal to completed, then walk up the
    /// EXTENDS chain recomputing each parent's progress from its
    /// completed children.
    fn complete_goal(&self, goal_id: &str) -> Result<()> {
        let Some(goal) = self.store.get_memory(goal_id)? else {
            return Err(crate::error::EngineError::NotFound(goal_id.to_string()));
        };
        let mut metadata = ensure_object(goal.metadata.clone());
        metadata["status"] = serde_json::Value::from("completed");
        self.store.update_memory_metadata(&goal.id, &metadata)?;

        let mut current = goal;
        for _ in 0..MAX_GOAL_DEPTH {
            let Some(parent) = self.goal_parent(&current)? else {
                break;
            };
            let children = self.goal_children(&parent)?;
            if children.is_empty() {
                break;
            }
            let completed = children
                .iter()
                .filter(|child| child.meta_str("status") == Some("completed"))
                .count();
            let progress =
                (100.0 * completed as f64 / children.len() as f64).round() as i64;
            let mut parent_metadata = ensure_object(parent.metadata.clone());
            parent_metadata["progress"] = serde_json::Value::from(progress);
            if completed == children.len() {
                parent_metadata["status"] = serde_json::Value::from("completed");
            }
            self.store
                .update_memory_metadata(&parent.id, &parent_metadata)?;
            current = self
                .store
                .get_memory(&parent.id)?
                .ok_or_else(|| crate::error::EngineError::NotFound(parent.id.clone()))?;
        }
        Ok(())
    }

    /// The goal this goal EXTENDS, if any.
    fn goal_parent(&self, goal: &Memory) -> Result<Option<Memory>> {
        for relation in self.store.relations_for(&goal.id)? {
            if relation.source_id == goal.id && relation.relation_type == RelationType::Extends {
                if let Some(target) = self.store.get_memory(&relation.target_id)? {
                    if target.is_goal() {
                        return Ok(Some(target));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Goals that EXTEND this goal.
    fn goal_children(&self, goal: &Memory) -> Result<Vec<Memory>> {
        let mut children = Vec::new();
        for relation in self.store.relations_for(&goal.id)? {
            if relation.target_id == goal.id && relation.relation_type == RelationType::Extends {
                if let Some(source) = self.store.get_memory(&relation.source_id)? {
                    if source.is_goal() {
                        children.push(source);
                    }
                }
            }
        }
        Ok(children)
    }
}

fn ensure_object(value: serde_json::Value) -> serde_json::Value {
    if value.is_object() {
        value
    } else {
        serde_json::json!({})
    }
}

// ============================================================================
// TESTS
// ============================================================================
