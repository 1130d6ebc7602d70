//! Memory module - Core types and data structures
//!
//! The typed domain model behind the content store: memories and their
//! relations, sessions, scheduled items, and per-user behavioral patterns.

mod entity;
mod patterns;
mod relation;
mod schedule;
mod session;

pub use entity::{LearnedFrom, Memory, MemoryCategory, MemoryDraft, MemoryKind};
pub use patterns::{
    analyze_affect, emotion_label, AffectEma, AffectState, BehavioralPatterns, ProactivenessDial,
    ResponsePreferences,
};
pub use relation::{Relation, RelationType};
pub use schedule::{
    BoardColumn, ItemKind, ItemSource, ItemStatus, Priority, ScheduledItem, ScheduledItemDraft,
};
pub use session::{MessageRole, Session, SessionMessage, SessionSummary};

use serde::{Deserialize, Serialize};

// ============================================================================
// USER-ID CHANNEL PREFIX
// ============================================================================

/// Known channel prefixes on incoming user identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserChannel {
    Telegram,
    Api,
}

impl UserChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserChannel::Telegram => "telegram",
            UserChannel::Api => "api",
        }
    }
}

/// Split a channel prefix off a user identifier.
///
/// Only `telegram:` and `api:` are recognized; anything else (including
/// other colon-bearing ids) is passed through untouched.
pub fn split_channel_prefix(user_id: &str) -> (Option<UserChannel>, &str) {
    if let Some(rest) = user_id.strip_prefix("telegram:") {
        (Some(UserChannel::Telegram), rest)
    } else if let Some(rest) = user_id.strip_prefix("api:") {
        (Some(UserChannel::Api), rest)
    } else {
        (None, user_id)
    }
}

// ============================================================================
// ENGINE STATISTICS
// ============================================================================

/// Engine-wide statistics reported by the content store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Total memory rows, including superseded
    pub total_memories: i64,
    /// Latest, non-superseded memories
    pub latest_memories: i64,
    /// Derived memories produced by background cycles
    pub derived_memories: i64,
    /// Average prominence over latest memories
    pub average_prominence: f64,
    /// Total relation edges
    pub total_relations: i64,
    /// Sessions recorded
    pub total_sessions: i64,
    /// Scheduled items currently pending
    pub pending_items: i64,
}
