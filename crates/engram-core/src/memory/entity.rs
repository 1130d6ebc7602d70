//! Memory entity - The fundamental unit of the content store
//!
//! Each memory represents one discrete piece of knowledge about a user with:
//! - Content, category, and lifecycle kind
//! - Prominence (derived salience) and access tracking
//! - Optional embedding and provenance metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORIES AND KINDS
// ============================================================================

/// Semantic category of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// A stated or inferred user preference
    Preference,
    /// A discrete fact about the user or their world
    #[default]
    Fact,
    /// An event or experience with a point in time
    Event,
    /// A relationship between the user and other people
    Relationship,
    /// A derived insight (fusion, exploration, reflection)
    Insight,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Event => "event",
            MemoryCategory::Relationship => "relationship",
            MemoryCategory::Insight => "insight",
        }
    }

    /// Parse from string name, defaulting to `Fact` for unknown input.
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "preference" => MemoryCategory::Preference,
            "fact" => MemoryCategory::Fact,
            "event" => MemoryCategory::Event,
            "relationship" => MemoryCategory::Relationship,
            "insight" => MemoryCategory::Insight,
            _ => MemoryCategory::Fact,
        }
    }

    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Preference,
        MemoryCategory::Fact,
        MemoryCategory::Event,
        MemoryCategory::Relationship,
        MemoryCategory::Insight,
    ];
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle kind of a memory
///
/// Static profile entries never decay; superseded entries are hidden from
/// latest views but never physically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Immutable profile entry, exempt from decay (prominence fixed at 1.0)
    StaticProfile,
    /// Evolving profile entry
    DynamicProfile,
    /// Ordinary ingested memory
    #[default]
    Regular,
    /// Produced by fusion, exploration, or reflection
    Derived,
    /// Replaced by a newer or consolidated memory
    Superseded,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::StaticProfile => "static_profile",
            MemoryKind::DynamicProfile => "dynamic_profile",
            MemoryKind::Regular => "regular",
            MemoryKind::Derived => "derived",
            MemoryKind::Superseded => "superseded",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "static_profile" => MemoryKind::StaticProfile,
            "dynamic_profile" => MemoryKind::DynamicProfile,
            "regular" => MemoryKind::Regular,
            "derived" => MemoryKind::Derived,
            "superseded" => MemoryKind::Superseded,
            _ => MemoryKind::Regular,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which background process produced a derived memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnedFrom {
    /// Sleep-cycle reflection over session summaries
    SelfReflection,
    /// Deep-sleep consolidation of a dormant cluster
    NremConsolidation,
    /// Novel relation minted during exploration
    RemExploration,
    /// Daytime fusion pass
    DaytimeFusion,
}

impl LearnedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnedFrom::SelfReflection => "self_reflection",
            LearnedFrom::NremConsolidation => "nrem_consolidation",
            LearnedFrom::RemExploration => "rem_exploration",
            LearnedFrom::DaytimeFusion => "daytime_fusion",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "self_reflection" => Some(LearnedFrom::SelfReflection),
            "nrem_consolidation" => Some(LearnedFrom::NremConsolidation),
            "rem_exploration" => Some(LearnedFrom::RemExploration),
            "daytime_fusion" => Some(LearnedFrom::DaytimeFusion),
            _ => None,
        }
    }
}

impl std::fmt::Display for LearnedFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// A memory in the content store
///
/// Prominence is strictly derived by the decay engine - it is never a
/// primary input. Supersession flips `is_latest` and `kind` atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning user identifier (may carry a channel prefix, e.g. `telegram:123`)
    pub user_id: String,
    /// The actual content
    pub content: String,
    /// Semantic category
    pub category: MemoryCategory,
    /// Lifecycle kind
    pub kind: MemoryKind,
    /// Semantic importance, 1..=10
    pub importance: u8,
    /// Confidence in the content, 0.0..=1.0
    pub confidence: f64,
    /// Whether this is the latest entry for its semantic identity
    pub is_latest: bool,
    /// When the source document/turn was produced (epoch ms)
    pub document_date: i64,
    /// When the described event happened, if any (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<i64>,
    /// Derived salience, 0.0..=1.0
    pub prominence: f64,
    /// Number of times retrieval returned this memory
    pub access_count: i64,
    /// Last retrieval timestamp (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_ms: Option<i64>,
    /// Embedding vector, when the embedding provider was available at ingest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Original raw text the memory was extracted from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_chunk: Option<String>,
    /// Opaque metadata bag (goal fields, source session ids, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Which background process produced this memory, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learned_from: Option<LearnedFrom>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last modified
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Whether the decay engine should touch this memory.
    pub fn decays(&self) -> bool {
        self.kind != MemoryKind::StaticProfile
    }

    /// Age in fractional days relative to `now_ms`, floored at zero.
    pub fn age_days(&self, now_ms: i64) -> f64 {
        ((now_ms - self.document_date).max(0)) as f64 / 86_400_000.0
    }

    /// Days since last access, if ever accessed.
    pub fn last_access_age_days(&self, now_ms: i64) -> Option<f64> {
        self.last_accessed_ms
            .map(|t| ((now_ms - t).max(0)) as f64 / 86_400_000.0)
    }

    /// Read a string field out of the metadata bag.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Read an integer field out of the metadata bag.
    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(|v| v.as_i64())
    }

    /// Whether this memory represents a goal (goal subsystem convention).
    pub fn is_goal(&self) -> bool {
        self.metadata
            .get("isGoal")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new memory
///
/// Uses `deny_unknown_fields` so malformed external payloads are rejected
/// at the boundary instead of silently dropping data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryDraft {
    /// Owning user identifier
    pub user_id: String,
    /// The content to remember
    pub content: String,
    /// Semantic category
    #[serde(default)]
    pub category: MemoryCategory,
    /// Lifecycle kind
    #[serde(default)]
    pub kind: MemoryKind,
    /// Semantic importance, 1..=10
    #[serde(default = "default_importance")]
    pub importance: u8,
    /// Confidence in the content, 0.0..=1.0
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// When the source document/turn was produced (epoch ms); None = now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_date: Option<i64>,
    /// When the described event happened (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<i64>,
    /// Original raw text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_chunk: Option<String>,
    /// Opaque metadata bag
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Which background process produced this memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learned_from: Option<LearnedFrom>,
    /// Embedding, when the caller pre-computed one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_importance() -> u8 {
    5
}

fn default_confidence() -> f64 {
    1.0
}

impl Default for MemoryDraft {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            content: String::new(),
            category: MemoryCategory::Fact,
            kind: MemoryKind::Regular,
            importance: default_importance(),
            confidence: default_confidence(),
            document_date: None,
            event_date: None,
            source_chunk: None,
            metadata: serde_json::Value::Null,
            learned_from: None,
            embedding: None,
        }
    }
}

impl MemoryDraft {
    /// Convenience constructor for the common ingest path.
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: MemoryCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    /// Validate field ranges at the public boundary.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        if self.content.trim().is_empty() {
            return Err("content must not be empty".to_string());
        }
        if !(1..=10).contains(&self.importance) {
            return Err(format!("importance {} out of range 1..=10", self.importance));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} out of range 0..=1", self.confidence));
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
    fn test_category_roundtrip() {
        for category in MemoryCategory::ALL {
            assert_eq!(MemoryCategory::parse_name(category.as_str()), category);
        }
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            MemoryKind::StaticProfile,
            MemoryKind::DynamicProfile,
            MemoryKind::Regular,
            MemoryKind::Derived,
            MemoryKind::Superseded,
        ] {
            assert_eq!(MemoryKind::parse_name(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_static_profile_exempt_from_decay() {
        let mut draft = MemoryDraft::new("u1", "name is Sam");
        draft.kind = MemoryKind::StaticProfile;
        // decays() is what the decay engine consults
        let memory = Memory {
            id: "m1".to_string(),
            user_id: draft.user_id,
            content: draft.content,
            category: draft.category,
            kind: draft.kind,
            importance: draft.importance,
            confidence: draft.confidence,
            is_latest: true,
            document_date: 0,
            event_date: None,
            prominence: 1.0,
            access_count: 0,
            last_accessed_ms: None,
            embedding: None,
            source_chunk: None,
            metadata: serde_json::Value::Null,
            learned_from: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!memory.decays());
    }

    #[test]
    fn test_draft_validation() {
        assert!(MemoryDraft::new("u1", "content").validate().is_ok());
        assert!(MemoryDraft::new("", "content").validate().is_err());
        assert!(MemoryDraft::new("u1", "  ").validate().is_err());

        let mut draft = MemoryDraft::new("u1", "content");
        draft.importance = 0;
        assert!(draft.validate().is_err());
        draft.importance = 11;
        assert!(draft.validate().is_err());

        let mut draft = MemoryDraft::new("u1", "content");
        draft.confidence = 1.5;
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_draft_deny_unknown_fields() {
        let json = r#"{"userId": "u1", "content": "test"}"#;
        let result: Result<MemoryDraft, _> = serde_json::from_str(json);
        assert!(result.is_ok());

        let json_with_unknown = r#"{"userId": "u1", "content": "test", "prominence": 0.9}"#;
        let result: Result<MemoryDraft, _> = serde_json::from_str(json_with_unknown);
        // Prominence is derived, never a primary input
        assert!(result.is_err());
    }

    #[test]
    fn test_age_days() {
        let memory = Memory {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            content: "c".to_string(),
            category: MemoryCategory::Fact,
            kind: MemoryKind::Regular,
            importance: 5,
            confidence: 1.0,
            is_latest: true,
            document_date: 0,
            event_date: None,
            prominence: 0.5,
            access_count: 0,
            last_accessed_ms: Some(86_400_000),
            embedding: None,
            source_chunk: None,
            metadata: serde_json::Value::Null,
            learned_from: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let two_days = 2 * 86_400_000;
        assert!((memory.age_days(two_days) - 2.0).abs() < 1e-9);
        assert!((memory.last_access_age_days(two_days).unwrap() - 1.0).abs() < 1e-9);
        // Clock never runs backwards past the document date
        assert_eq!(memory.age_days(-5), 0.0);
    }
}
