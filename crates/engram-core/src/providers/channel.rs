//! Delivery channels and the skill runner
//!
//! Channels translate their transport to the engine's typed entry
//! points; the engine only ever calls back out through these traits to
//! deliver nudges and task results.

use std::path::Path;

use async_trait::async_trait;

use super::ProviderError;

/// Outbound delivery adapter supplied by a front-end channel
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Deliver a text message to a user.
    async fn send_message(&self, user_id: &str, text: &str) -> Result<(), ProviderError>;

    /// Deliver a file with an optional caption.
    async fn send_file(
        &self,
        user_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), ProviderError>;

    /// Channel label (`telegram`, `api`, ...).
    fn name(&self) -> &str;
}

/// Result of a skill-runner invocation
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    /// Textual result of the run
    pub result: String,
    /// How many iterations the runner took
    pub iterations: u32,
}

/// External process runner for task-kind scheduled items
#[async_trait]
pub trait SkillRunner: Send + Sync {
    /// Execute a goal, optionally restricted to an allow-list of tools.
    async fn run(
        &self,
        goal: &str,
        allowed_tools: Option<&[String]>,
    ) -> Result<SkillOutcome, ProviderError>;
}
