//! Engagement tracking and the trust score
//!
//! A user message arriving within the engagement window after a
//! proactive item fired flips that item to acted. The acted-to-fired
//! ratio over the last week drives the trust score, which in turn sets
//! the proactiveness dial consumed by the gap pipeline.

use std::sync::Arc;

use crate::error::Result;
use crate::memory::{ItemStatus, ProactivenessDial};
use crate::storage::ContentStore;

/// Configuration for engagement tracking
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// How long after firing a user message still counts as engagement
    pub window_ms: i64,
    /// Trust below this is conservative
    pub conservative_below: f64,
    /// Trust above this is eager
    pub eager_above: f64,
    /// Cold start: fewer completed sessions than this keeps the dial moderate
    pub min_sessions: i64,
    /// Trust lookback window in days
    pub lookback_days: i64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            window_ms: 86_400_000,
            conservative_below: 0.3,
            eager_above: 0.7,
            min_sessions: 5,
            lookback_days: 7,
        }
    }
}

/// Engagement tracker
pub struct EngagementTracker {
    store: Arc<ContentStore>,
    config: EngagementConfig,
}

impl EngagementTracker {
    pub fn new(store: Arc<ContentStore>, config: EngagementConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngagementConfig {
        &self.config
    }

    /// The user sent a message: flip recently fired items to acted.
    /// Returns how many items flipped.
    pub fn note_user_activity(&self, user_id: &str, now_ms: i64) -> Result<usize> {
        let fired = self
            .store
            .list_scheduled_items(user_id, Some(ItemStatus::Fired))?;
        let mut flipped = 0;
        for item in fired {
            let Some(fired_at) = item.fired_at else {
                continue;
            };
            if now_ms - fired_at <= self.config.window_ms {
                self.store
                    .transition_item(&item.id, ItemStatus::Acted, now_ms)?;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    /// Acted-to-fired ratio over the lookback window. With no fired
    /// items at all, trust sits at a neutral 0.5.
    pub fn trust_score(&self, user_id: &str, now_ms: i64) -> Result<f64> {
        let since = now_ms - self.config.lookback_days * 86_400_000;
        let acted = self
            .store
            .count_items_since(user_id, ItemStatus::Acted, since)?;
        let still_fired = self
            .store
            .count_items_since(user_id, ItemStatus::Fired, since)?;
        let total = acted + still_fired;
        if total == 0 {
            return Ok(0.5);
        }
        Ok(acted as f64 / total as f64)
    }

    /// Recompute the proactiveness dial from the trust score and write
    /// it back into the user's behavioral patterns (best-effort).
    pub fn refresh_dial(&self, user_id: &str, now_ms: i64) -> Result<ProactivenessDial> {
        let mut patterns = self
            .store
            .get_patterns(user_id)?
            .unwrap_or_else(|| crate::memory::BehavioralPatterns::new(user_id));

        let trust = self.trust_score(user_id, now_ms)?;
        let dial = if patterns.completed_sessions < self.config.min_sessions {
            ProactivenessDial::Moderate
        } else if trust < self.config.conservative_below {
            ProactivenessDial::Conservative
        } else if trust > self.config.eager_above {
            ProactivenessDial::Eager
        } else {
            ProactivenessDial::Moderate
        };

        patterns.preferences.trust_score = trust;
        patterns.preferences.proactiveness_dial = dial;
        if let Err(error) = self.store.put_patterns(&patterns) {
            tracing::warn!("behavioral-pattern write failed for {user_id}: {error}");
        }
        Ok(dial)
    }
}

// ============================================================================
// TESTS
// ============================================================================
