//! Typed relations between memories
//!
//! Relations are owned by the content store; the relation graph is a
//! derived view that reads and writes through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of a directed relation between two memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationType {
    /// Target is an older version of the same fact; source replaces it
    Updates,
    /// Source adds detail to the target
    Extends,
    /// Source was consolidated from the target
    Derives,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Updates => "UPDATES",
            RelationType::Extends => "EXTENDS",
            RelationType::Derives => "DERIVES",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UPDATES" => Some(RelationType::Updates),
            "EXTENDS" => Some(RelationType::Extends),
            "DERIVES" => Some(RelationType::Derives),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge from one memory to another
///
/// Self-loops are rejected at the store boundary; duplicate
/// (source, target, type) edges are deduplicated on the stronger confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Unique edge identifier (UUID v4)
    pub id: String,
    /// Source memory id
    pub source_id: String,
    /// Target memory id
    pub target_id: String,
    /// Relation type
    pub relation_type: RelationType,
    /// Confidence in this edge, 0.0..=1.0
    pub confidence: f64,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// The endpoint that is not `id`, if this edge touches `id` at all.
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source_id == id {
            Some(&self.target_id)
        } else if self.target_id == id {
            Some(&self.source_id)
        } else {
            None
        }
    }

    /// Whether this edge connects `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_id == a && self.target_id == b)
            || (self.source_id == b && self.target_id == a)
    }
}
