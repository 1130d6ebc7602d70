//! Reflection Engine
//!
//! Sleep-cycle self-reflection: recent session summaries become insight
//! memories, and a separate distillation prompt produces SOUL.md - a
//! persisted guideline document at the workspace root. Runs only when a
//! writable workspace is configured.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{timeout, Duration};

use crate::error::Result;
use crate::memory::{LearnedFrom, MemoryCategory, MemoryDraft, MemoryKind, SessionSummary};
use crate::providers::{extract_json, CompletionRequest, LanguageProvider, ProviderError};
use crate::storage::ContentStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the reflection engine
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    /// How far back to gather session summaries
    pub lookback_hours: i64,
    /// Minimum summaries a user needs before reflection runs
    pub min_summaries: i64,
    /// Workspace root for SOUL.md; None disables reflection entirely
    pub workspace_dir: Option<PathBuf>,
    /// Per-call language budget
    pub timeout_ms: u64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            min_summaries: 2,
            workspace_dir: None,
            timeout_ms: 30_000,
        }
    }
}

/// Outcome counters for one reflection pass
#[derive(Debug, Clone, Default)]
pub struct ReflectionReport {
    pub users_reflected: usize,
    pub insights_written: usize,
    pub soul_written: bool,
    pub failures: usize,
}

// ============================================================================
// REFLECTION ENGINE
// ============================================================================

/// The reflection engine
pub struct ReflectionEngine {
    store: Arc<ContentStore>,
    language: Arc<dyn LanguageProvider>,
    config: ReflectionConfig,
}

impl ReflectionEngine {
    pub fn new(
        store: Arc<ContentStore>,
        language: Arc<dyn LanguageProvider>,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            store,
            language,
            config,
        }
    }

    /// Run one reflection pass across all eligible users.
    pub async fn run(&self) -> Result<ReflectionReport> {
        let mut report = ReflectionReport::default();
        let Some(workspace) = self.config.workspace_dir.clone() else {
            tracing::debug!("reflection skipped: no workspace configured");
            return Ok(report);
        };
        if !self.language.is_available() {
            tracing::debug!("reflection skipped: language capability unavailable");
            return Ok(report);
        }

        let since = Utc::now() - ChronoDuration::hours(self.config.lookback_hours);
        let users = self
            .store
            .users_with_recent_summaries(since, self.config.min_summaries)?;

        let mut all_principles: Vec<String> = Vec::new();
        for user_id in &users {
            let summaries = self.store.recent_session_summaries(user_id, since)?;
            match self.reflect_user(user_id, &summaries).await {
                Ok((written, principles)) => {
                    report.users_reflected += 1;
                    report.insights_written += written;
                    all_principles.extend(principles);
                }
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!("reflection failed for {user_id}: {error}");
                }
            }
        }

        if report.users_reflected > 0 {
            match self.distill_soul(&all_principles).await {
                Ok(markdown) => {
                    let path = workspace.join("SOUL.md");
                    let write_result =
                        tokio::task::spawn_blocking(move || std::fs::write(path, markdown))
                            .await
                            .map_err(|join| {
                                ProviderError::Transport(format!("soul write task failed: {join}"))
                            })?;
                    match write_result {
                        Ok(()) => report.soul_written = true,
                        Err(error) => {
                            report.failures += 1;
                            tracing::warn!("SOUL.md write failed: {error}");
                        }
                    }
                }
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!("soul distillation failed: {error}");
                }
            }
        }
        Ok(report)
    }

    /// Reflect over one user's recent sessions. Returns the number of
    /// insight memories written and any distilled principles.
    async fn reflect_user(
        &self,
        user_id: &str,
        summaries: &[SessionSummary],
    ) -> Result<(usize, Vec<String>)> {
        let system = "You reflect on recent conversations with a user and extract durable \
            insights. Reply with a JSON object: {\"insights\": [{\"content\": \"...\", \
            \"topics\": [\"...\"]}], \"principles\": [\"...\"]}. Insights are things worth \
            remembering about the user; principles are guidelines for future conversations.";
        let mut user = String::from("Recent session summaries:\n");
        for summary in summaries {
            user.push_str(&format!(
                "- [{} messages] {}\n",
                summary.message_count, summary.summary
            ));
        }
        let request = CompletionRequest::single_turn(system, user).with_max_tokens(1024);

        let completion = timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.language.complete(request),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.timeout_ms))??;

        let parsed = extract_json(&completion.text())
            .ok_or_else(|| ProviderError::Model("unparseable reflection response".to_string()))?;

        let session_ids: Vec<&str> = summaries
            .iter()
            .map(|summary| summary.session_id.as_str())
            .collect();
        let mut written = 0;
        if let Some(insights) = parsed.get("insights").and_then(|value| value.as_array()) {
            for insight in insights {
                let Some(content) = insight.get("content").and_then(|value| value.as_str()) else {
                    continue;
                };
                if content.trim().is_empty() {
                    continue;
                }
                let topics = insight
                    .get("topics")
                    .cloned()
                    .unwrap_or(serde_json::Value::Array(Vec::new()));
                let mut draft = MemoryDraft::new(user_id, content);
                draft.category = MemoryCategory::Insight;
                draft.kind = MemoryKind::Derived;
                draft.learned_from = Some(LearnedFrom::SelfReflection);
                draft.metadata = serde_json::json!({
                    "sourceSessionIds": session_ids,
                    "topics": topics,
                });
                self.store.add_memory(draft)?;
                written += 1;
            }
        }

        let principles = parsed
            .get("principles")
            .and_then(|value| value.as_array())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok((written, principles))
    }

    /// The soul distillation prompt: plain markdown out, no JSON.
    async fn distill_soul(&self, principles: &[String]) -> Result<String> {
        let system = "You distill conversation principles into a short guideline document \
            for a personal assistant. Output plain markdown, no code fences.";
        let mut user = String::from(
            "Distill these principles into a guideline document titled '# Soul':\n",
        );
        if principles.is_empty() {
            user.push_str("(no explicit principles this cycle; write a minimal document)\n");
        }
        for principle in principles {
            user.push_str(&format!("- {principle}\n"));
        }
        let request = CompletionRequest::single_turn(system, user)
            .with_temperature(0.5)
            .with_max_tokens(2048);

        let completion = timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.language.complete(request),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.timeout_ms))??;

        let markdown = completion.text();
        if markdown.trim().is_empty() {
            return Err(ProviderError::Model("empty soul distillation".to_string()).into());
        }
        Ok(markdown)
    }
}

// ============================================================================
// TESTS
// ============================================================================
