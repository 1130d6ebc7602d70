//! Scheduled items and the kanban board projection
//!
//! A scheduled item is the unit of proactive behavior: a nudge or a task,
//! created by users, the gap pipeline, or the goal subsystem. `board_status`
//! is a projection of `status` plus explicit board moves - the mapping
//! lives here so the store and the board agree on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DISCRIMINATORS
// ============================================================================

/// Who created the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    #[default]
    User,
    Agent,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSource::User => "user",
            ItemSource::Agent => "agent",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "agent" => ItemSource::Agent,
            _ => ItemSource::User,
        }
    }
}

/// Delivery mechanism: a nudge is a message, a task runs through the skill runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Nudge,
    Task,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Nudge => "nudge",
            ItemKind::Task => "task",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "task" => ItemKind::Task,
            _ => ItemKind::Nudge,
        }
    }
}

/// Underlying lifecycle status of a scheduled item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Fired,
    Acted,
    Dismissed,
    Expired,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Fired => "fired",
            ItemStatus::Acted => "acted",
            ItemStatus::Dismissed => "dismissed",
            ItemStatus::Expired => "expired",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => ItemStatus::Processing,
            "fired" => ItemStatus::Fired,
            "acted" => ItemStatus::Acted,
            "dismissed" => ItemStatus::Dismissed,
            "expired" => ItemStatus::Expired,
            _ => ItemStatus::Pending,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Fired | ItemStatus::Acted | ItemStatus::Dismissed | ItemStatus::Expired
        )
    }

    /// Legal transitions of the state machine.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        match self {
            ItemStatus::Pending => matches!(
                next,
                ItemStatus::Processing | ItemStatus::Dismissed | ItemStatus::Expired
            ),
            ItemStatus::Processing => matches!(
                next,
                ItemStatus::Fired | ItemStatus::Pending | ItemStatus::Dismissed
            ),
            ItemStatus::Fired => matches!(next, ItemStatus::Acted | ItemStatus::Dismissed),
            // Terminal apart from the engagement flip handled above
            ItemStatus::Acted | ItemStatus::Dismissed | ItemStatus::Expired => false,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kanban column a scheduled item sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardColumn {
    Inbox,
    Backlog,
    Scheduled,
    InProgress,
    Waiting,
    Done,
    Archived,
}

impl BoardColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardColumn::Inbox => "inbox",
            BoardColumn::Backlog => "backlog",
            BoardColumn::Scheduled => "scheduled",
            BoardColumn::InProgress => "in_progress",
            BoardColumn::Waiting => "waiting",
            BoardColumn::Done => "done",
            BoardColumn::Archived => "archived",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inbox" => Some(BoardColumn::Inbox),
            "backlog" => Some(BoardColumn::Backlog),
            "scheduled" => Some(BoardColumn::Scheduled),
            "in_progress" => Some(BoardColumn::InProgress),
            "waiting" => Some(BoardColumn::Waiting),
            "done" => Some(BoardColumn::Done),
            "archived" => Some(BoardColumn::Archived),
            _ => None,
        }
    }

    /// Projection of a board move onto the underlying status.
    pub fn projected_status(&self) -> ItemStatus {
        match self {
            BoardColumn::Done => ItemStatus::Fired,
            BoardColumn::Archived => ItemStatus::Dismissed,
            BoardColumn::InProgress => ItemStatus::Processing,
            BoardColumn::Inbox
            | BoardColumn::Backlog
            | BoardColumn::Scheduled
            | BoardColumn::Waiting => ItemStatus::Pending,
        }
    }

    pub const ALL: [BoardColumn; 7] = [
        BoardColumn::Inbox,
        BoardColumn::Backlog,
        BoardColumn::Scheduled,
        BoardColumn::InProgress,
        BoardColumn::Waiting,
        BoardColumn::Done,
        BoardColumn::Archived,
    ];
}

impl std::fmt::Display for BoardColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority of a scheduled item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Medium,
        }
    }
}

// ============================================================================
// SCHEDULED ITEM
// ============================================================================

/// A scheduled item on the board
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledItem {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning user identifier
    pub user_id: String,
    /// Session the item was created in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Who created the item
    pub source: ItemSource,
    /// Delivery mechanism
    pub kind: ItemKind,
    /// Free-text classification: reminder, follow_up, goal_checkin, event_prep
    pub item_type: String,
    /// The message to deliver (nudge) or the goal text (task)
    pub message: String,
    /// Structured context (gapType, sourceId, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// When the item becomes eligible to fire (epoch ms); 0 = unscheduled
    pub trigger_at: i64,
    /// Recurrence rule (`every:<seconds>`), if the item repeats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<String>,
    /// Lifecycle status
    pub status: ItemStatus,
    /// Board column projection
    pub board_status: BoardColumn,
    /// Priority
    pub priority: Priority,
    /// Free-form labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// Items that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Linked goal memory id, for the completion bridge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// Task configuration handed to the skill runner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_config: Option<serde_json::Value>,
    /// Result payload written back after a task run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// When the item fired (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fired_at: Option<i64>,
    /// When a task run completed (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last modified
    pub updated_at: DateTime<Utc>,
}

impl ScheduledItem {
    /// Whether this item is eligible to fire at `now_ms`.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status == ItemStatus::Pending && self.trigger_at > 0 && self.trigger_at <= now_ms
    }

    /// Parse the recurrence rule, returning the repeat interval in ms.
    pub fn recurrence_interval_ms(&self) -> Option<i64> {
        let rule = self.recurring.as_deref()?;
        let seconds = rule.strip_prefix("every:")?.parse::<i64>().ok()?;
        (seconds > 0).then_some(seconds * 1000)
    }
}

/// Input for creating a scheduled item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduledItemDraft {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub source: ItemSource,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default = "default_item_type")]
    pub item_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub trigger_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<String>,
    /// Explicit column; None lets the default-column rule decide
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_status: Option<BoardColumn>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_config: Option<serde_json::Value>,
}

fn default_item_type() -> String {
    "reminder".to_string()
}

impl ScheduledItemDraft {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            source: ItemSource::User,
            kind: ItemKind::Nudge,
            item_type: default_item_type(),
            message: message.into(),
            context: None,
            trigger_at: 0,
            recurring: None,
            board_status: None,
            priority: Priority::Medium,
            labels: Vec::new(),
            depends_on: Vec::new(),
            goal_id: None,
            task_config: None,
        }
    }

    /// Default column on creation: explicit wins, then scheduled (has a
    /// trigger), then inbox for agent-created items, then backlog.
    pub fn default_column(&self) -> BoardColumn {
        if let Some(column) = self.board_status {
            return column;
        }
        if self.trigger_at > 0 {
            BoardColumn::Scheduled
        } else if self.source == ItemSource::Agent {
            BoardColumn::Inbox
        } else {
            BoardColumn::Backlog
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        if self.trigger_at < 0 {
            return Err("trigger_at must not be negative".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_table() {
        assert_eq!(BoardColumn::Done.projected_status(), ItemStatus::Fired);
        assert_eq!(BoardColumn::Archived.projected_status(), ItemStatus::Dismissed);
        assert_eq!(
            BoardColumn::InProgress.projected_status(),
            ItemStatus::Processing
        );
        for column in [
            BoardColumn::Inbox,
            BoardColumn::Backlog,
            BoardColumn::Scheduled,
            BoardColumn::Waiting,
        ] {
            assert_eq!(column.projected_status(), ItemStatus::Pending);
        }
    }

    #[test]
    fn test_default_column_rule() {
        let mut draft = ScheduledItemDraft::new("u1", "check in");
        assert_eq!(draft.default_column(), BoardColumn::Backlog);

        draft.source = ItemSource::Agent;
        assert_eq!(draft.default_column(), BoardColumn::Inbox);

        draft.trigger_at = 1_700_000_000_000;
        assert_eq!(draft.default_column(), BoardColumn::Scheduled);

        draft.board_status = Some(BoardColumn::Waiting);
        assert_eq!(draft.default_column(), BoardColumn::Waiting);
    }

    #[test]
    fn test_status_machine() {
        assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Processing));
        assert!(ItemStatus::Processing.can_transition_to(ItemStatus::Fired));
        assert!(ItemStatus::Processing.can_transition_to(ItemStatus::Pending));
        assert!(ItemStatus::Fired.can_transition_to(ItemStatus::Acted));
        assert!(!ItemStatus::Acted.can_transition_to(ItemStatus::Pending));
        assert!(!ItemStatus::Expired.can_transition_to(ItemStatus::Processing));
        assert!(!ItemStatus::Pending.can_transition_to(ItemStatus::Fired));
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [
            ItemStatus::Fired,
            ItemStatus::Acted,
            ItemStatus::Dismissed,
            ItemStatus::Expired,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!ItemStatus::Pending.is_terminal());
        assert!(!ItemStatus::Processing.is_terminal());
    }

    #[test]
    fn test_column_roundtrip() {
        for column in BoardColumn::ALL {
            assert_eq!(BoardColumn::parse_name(column.as_str()), Some(column));
        }
    }

    #[test]
    fn test_recurrence_parsing() {
        let mut item_draft = ScheduledItemDraft::new("u1", "water the plants");
        item_draft.recurring = Some("every:86400".to_string());
        let item = ScheduledItem {
            id: "i1".to_string(),
            user_id: item_draft.user_id.clone(),
            session_id: None,
            source: ItemSource::User,
            kind: ItemKind::Nudge,
            item_type: "reminder".to_string(),
            message: item_draft.message.clone(),
            context: None,
            trigger_at: 1000,
            recurring: item_draft.recurring.clone(),
            status: ItemStatus::Pending,
            board_status: BoardColumn::Scheduled,
            priority: Priority::Medium,
            labels: vec![],
            depends_on: vec![],
            goal_id: None,
            task_config: None,
            result: None,
            fired_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(item.recurrence_interval_ms(), Some(86_400_000));
        assert!(item.is_due(2000));
        assert!(!item.is_due(500));
    }

    #[test]
    fn test_draft_validation() {
        assert!(ScheduledItemDraft::new("u1", "msg").validate().is_ok());
        assert!(ScheduledItemDraft::new("", "msg").validate().is_err());
        assert!(ScheduledItemDraft::new("u1", " ").validate().is_err());
    }
}
