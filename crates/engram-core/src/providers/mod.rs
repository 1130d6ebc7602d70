//! Capability boundaries
//!
//! The engine assumes nothing about where vectors or completions come
//! from: embedding and language providers, delivery channels, and the
//! skill runner are trait objects handed in at construction. Failures
//! surface as [`ProviderError`] and are recovered locally by each
//! pipeline (skip rerank, per-cluster failure counter, fail-safe triage).

mod channel;
mod embedding;
mod language;

pub use channel::{ChannelAdapter, SkillOutcome, SkillRunner};
pub use embedding::EmbeddingProvider;
pub use language::{
    extract_json, ChatMessage, ChatRole, Completion, CompletionRequest, ContentBlock,
    LanguageProvider, StopReason, Usage,
};

/// Errors surfaced by providers and channels
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Network / transport failure
    #[error("transport error: {0}")]
    Transport(String),
    /// The model rejected or failed the request
    #[error("model error: {0}")]
    Model(String),
    /// The call exceeded its budget
    #[error("timed out after {0} ms")]
    Timeout(u64),
    /// The capability is not configured or currently unavailable
    #[error("capability unavailable: {0}")]
    Unavailable(String),
}
