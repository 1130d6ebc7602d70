//! Conversation sessions and their summaries
//!
//! Sessions are created when a channel opens a conversation and closed
//! implicitly by inactivity. Summaries feed the reflection cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message inside a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolResult,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::ToolResult => "tool_result",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool_result" => Some(MessageRole::ToolResult),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning user identifier
    pub user_id: String,
    /// When the session was opened
    pub created_at: DateTime<Utc>,
    /// Compact recap, written once the session goes quiet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One message within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    /// Session this message belongs to
    pub session_id: String,
    /// Who produced the message
    pub role: MessageRole,
    /// Message text (tool results carry their payload here)
    pub content: String,
    /// When the message arrived (epoch ms)
    pub timestamp_ms: i64,
}

/// Per-session compact recap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session this summary describes
    pub session_id: String,
    /// Owning user identifier
    pub user_id: String,
    /// Recap text
    pub summary: String,
    /// Topic tags extracted from the conversation
    #[serde(default)]
    pub topics: Vec<String>,
    /// Number of messages in the session
    pub message_count: i64,
    /// Wall-clock span of the session in milliseconds
    pub duration_ms: i64,
    /// When the summary was written
    pub created_at: DateTime<Utc>,
}
