//! Language capability
//!
//! Text-completion calls with structured (JSON) output. The engine only
//! ever reads back ordered content blocks, usage counters, and a stop
//! reason; everything provider-specific stays behind the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Role in a completion conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// System prompt
    pub system: String,
    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Output token budget
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Single-turn request with one user message, the common shape for
    /// the engine's structured-output prompts.
    pub fn single_turn(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: vec![ChatMessage::user(user)],
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// One ordered block of a completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// A structured tool invocation requested by the model
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Token usage counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Why the model stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
}

/// A completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
    /// Why generation stopped
    pub stop_reason: StopReason,
    /// Token usage
    pub usage: Usage,
}

impl Completion {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }

    /// Convenience constructor for a plain-text completion.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Capability contract for text completion
///
/// Must be safe to call concurrently; the engine wraps every call in a
/// `tokio::time::timeout` with a per-component budget.
#[async_trait]
pub trait LanguageProvider: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Availability probe. Background cycles that need the language
    /// capability skip their LLM stages when this returns false.
    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// STRUCTURED-OUTPUT PARSING
// ============================================================================

/// Pull the first JSON value out of a model response.
///
/// Tolerates markdown code fences and leading/trailing prose; returns
/// None when nothing parseable is found. Callers treat None as a
/// capability failure and fall back per their own policy.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    // Direct parse first
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // Strip a ```json ... ``` fence
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str(after[..end].trim()) {
                return Some(value);
            }
        }
    }

    // Last resort: widest braces / brackets span
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}
