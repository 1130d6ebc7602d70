//! Gap Pipeline
//!
//! Two-stage diagnosis of behavioral gaps: heuristic signal collection
//! (goal staleness, deadlines, rate anomalies, unresolved threads)
//! followed by a fail-safe language triage, ending in scheduled
//! follow-up items planned around the user's active hours.

pub mod signals;
pub mod triage;

pub use signals::{
    active_goals, collect_signals, days_remaining, deadline_message, goal_urgency, GapKind,
    GapSignal, GoalView, Severity, SignalConfig, Urgency,
};
pub use triage::{
    build_triage_prompt, fail_safe, filter_actionable, parse_triage, triage, TriageDiagnosis,
};

use std::sync::Arc;

use crate::board::{plan_delivery_time, SchedulerConfig};
use crate::error::Result;
use crate::memory::{ItemSource, Priority, ProactivenessDial, ScheduledItemDraft};
use crate::providers::LanguageProvider;
use crate::storage::ContentStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the gap pipeline
#[derive(Debug, Clone)]
pub struct GapConfig {
    /// Stage-1 heuristics
    pub signals: SignalConfig,
    /// Word-overlap threshold for duplicate suppression
    pub dedup_threshold: f64,
    /// Triage language budget
    pub timeout_ms: u64,
    /// Delivery planning (quiet hours, active windows)
    pub scheduler: SchedulerConfig,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            signals: SignalConfig::default(),
            dedup_threshold: 0.8,
            timeout_ms: 30_000,
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Outcome counters for one gap pass
#[derive(Debug, Clone, Default)]
pub struct GapReport {
    pub signals_collected: usize,
    pub diagnoses_actionable: usize,
    pub items_scheduled: usize,
    pub suppressed_duplicates: usize,
}

// ============================================================================
// GAP PIPELINE
// ============================================================================

/// The gap pipeline
pub struct GapPipeline {
    store: Arc<ContentStore>,
    language: Arc<dyn LanguageProvider>,
    config: GapConfig,
}

impl GapPipeline {
    pub fn new(
        store: Arc<ContentStore>,
        language: Arc<dyn LanguageProvider>,
        config: GapConfig,
    ) -> Self {
        Self {
            store,
            language,
            config,
        }
    }

    /// Run both stages for one user.
    pub async fn run(&self, user_id: &str, now_ms: i64) -> Result<GapReport> {
        let mut report = GapReport::default();

        let signals = collect_signals(&self.store, user_id, now_ms, &self.config.signals)?;
        report.signals_collected = signals.len();
        if signals.is_empty() {
            return Ok(report);
        }

        let patterns = self.store.get_patterns(user_id)?;
        let dial = patterns
            .as_ref()
            .map(|p| p.preferences.proactiveness_dial)
            .unwrap_or(ProactivenessDial::Moderate);
        let emotion = patterns
            .as_ref()
            .map(|p| p.affect.emotion.clone())
            .filter(|emotion| !emotion.is_empty())
            .unwrap_or_else(|| "neutral".to_string());

        let diagnoses = triage(
            self.language.as_ref(),
            &signals,
            dial,
            &emotion,
            self.config.timeout_ms,
        )
        .await;

        for diagnosis in filter_actionable(&diagnoses, &signals, dial) {
            report.diagnoses_actionable += 1;
            let signal = &signals[diagnosis.index];

            let message = if diagnosis.suggested_action.is_empty() {
                signal.description.clone()
            } else {
                diagnosis.suggested_action.clone()
            };

            // Near-identical pending reminders never stack
            if self
                .store
                .find_similar_pending(user_id, &message, self.config.dedup_threshold)?
                .is_some()
            {
                report.suppressed_duplicates += 1;
                continue;
            }

            let priority = match signal.severity {
                Severity::High => Priority::High,
                Severity::Medium => Priority::Medium,
                Severity::Low => Priority::Low,
            };
            let trigger_at =
                plan_delivery_time(priority, patterns.as_ref(), now_ms, &self.config.scheduler);

            let mut draft = ScheduledItemDraft::new(user_id, message);
            draft.source = ItemSource::Agent;
            draft.item_type = "follow_up".to_string();
            draft.priority = priority;
            draft.trigger_at = trigger_at;
            draft.context = Some(serde_json::json!({
                "gapType": signal.kind.as_str(),
                "sourceId": signal.source_id,
                "diagnosis": diagnosis.diagnosis,
                "confidence": diagnosis.confidence,
            }));
            self.store.add_scheduled_item(draft)?;
            report.items_scheduled += 1;
        }
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BehavioralPatterns, ItemStatus, MemoryDraft};
    use crate::providers::{Completion, CompletionRequest, ProviderError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct ScriptedTriage {
        reply: Option<String>,
    }

    #[async_trait]
    impl LanguageProvider for ScriptedTriage {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<Completion, ProviderError> {
            match &self.reply {
                Some(reply) => Ok(Completion::from_text(reply.clone())),
                None => Err(ProviderError::Transport("offline".to_string())),
            }
        }
    }

    fn open_store() -> (TempDir, Arc<ContentStore>) {
        let dir = TempDir::new().unwrap();
        let store =
            Arc::new(ContentStore::new(Some(dir.path().join("engram.db"))).unwrap());
        (dir, store)
    }

    fn seed_stale_goal(store: &ContentStore) -> i64 {
        let mut draft = MemoryDraft::new("u1", "Learn Rust");
        draft.metadata = serde_json::json!({"isGoal": true, "status": "active"});
        store.add_memory(draft).unwrap();
        // "Now" is 15 days after the goal was written
        chrono::Utc::now().timestamp_millis() + 15 * 86_400_000
    }

    fn patterns_with_dial(store: &ContentStore, dial: ProactivenessDial) {
        let mut patterns = BehavioralPatterns::new("u1");
        patterns.preferences.proactiveness_dial = dial;
        store.put_patterns(&patterns).unwrap();
    }

    const ACTIONABLE_REPLY: &str = r#"[{"index": 0, "actionable": true, "confidence": 0.5,
        "diagnosis": "goal went quiet", "suggestedAction": "Ask how the Rust learning is going"}]"#;

    #[tokio::test]
    async fn test_conservative_dial_blocks_medium_severity() {
        let (_dir, store) = open_store();
        let now_ms = seed_stale_goal(&store);
        patterns_with_dial(&store, ProactivenessDial::Conservative);

        let pipeline = GapPipeline::new(
            store.clone(),
            Arc::new(ScriptedTriage {
                reply: Some(ACTIONABLE_REPLY.to_string()),
            }),
            GapConfig::default(),
        );
        let report = pipeline.run("u1", now_ms).await.unwrap();
        assert_eq!(report.signals_collected, 1);
        // Stale-goal signals are medium severity; conservative requires high
        assert_eq!(report.items_scheduled, 0);
    }

    #[tokio::test]
    async fn test_moderate_dial_schedules_follow_up() {
        let (_dir, store) = open_store();
        let now_ms = seed_stale_goal(&store);
        patterns_with_dial(&store, ProactivenessDial::Moderate);

        let pipeline = GapPipeline::new(
            store.clone(),
            Arc::new(ScriptedTriage {
                reply: Some(ACTIONABLE_REPLY.to_string()),
            }),
            GapConfig::default(),
        );
        let report = pipeline.run("u1", now_ms).await.unwrap();
        assert_eq!(report.items_scheduled, 1);

        let pending = store
            .list_scheduled_items("u1", Some(ItemStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        let item = &pending[0];
        assert!(item.message.contains("Rust"));
        assert_eq!(item.source, ItemSource::Agent);
        assert_eq!(item.item_type, "follow_up");
        let context = item.context.as_ref().unwrap();
        assert_eq!(context["gapType"], "stale_goal");
        assert!(context["sourceId"].is_string());
        assert!(item.trigger_at >= now_ms);
    }

    #[tokio::test]
    async fn test_llm_failure_schedules_nothing() {
        let (_dir, store) = open_store();
        let now_ms = seed_stale_goal(&store);
        patterns_with_dial(&store, ProactivenessDial::Eager);

        let pipeline = GapPipeline::new(
            store.clone(),
            Arc::new(ScriptedTriage { reply: None }),
            GapConfig::default(),
        );
        let report = pipeline.run("u1", now_ms).await.unwrap();
        assert_eq!(report.signals_collected, 1);
        assert_eq!(report.items_scheduled, 0);
    }

    #[tokio::test]
    async fn test_duplicate_reminder_suppressed() {
        let (_dir, store) = open_store();
        let now_ms = seed_stale_goal(&store);
        patterns_with_dial(&store, ProactivenessDial::Moderate);

        // A near-identical reminder already pending
        store
            .add_scheduled_item(ScheduledItemDraft::new(
                "u1",
                "Ask how the Rust learning is going",
            ))
            .unwrap();

        let pipeline = GapPipeline::new(
            store.clone(),
            Arc::new(ScriptedTriage {
                reply: Some(ACTIONABLE_REPLY.to_string()),
            }),
            GapConfig::default(),
        );
        let report = pipeline.run("u1", now_ms).await.unwrap();
        assert_eq!(report.suppressed_duplicates, 1);
        assert_eq!(report.items_scheduled, 0);
    }

    #[tokio::test]
    async fn test_no_signals_no_llm_call() {
        let (_dir, store) = open_store();
        let pipeline = GapPipeline::new(
            store.clone(),
            Arc::new(ScriptedTriage { reply: None }),
            GapConfig::default(),
        );
        // An offline language provider is never consulted when there is
        // nothing to triage
        let report = pipeline
            .run("u1", chrono::Utc::now().timestamp_millis())
            .await
            .unwrap();
        assert_eq!(report.signals_collected, 0);
        assert_eq!(report.items_scheduled, 0);
    }
}
