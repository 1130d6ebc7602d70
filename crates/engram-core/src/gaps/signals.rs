//! Gap signals - Stage 1 heuristics
//!
//! Scans active goals for staleness and deadline urgency, behavioral
//! patterns for rate anomalies, and session summaries for unresolved
//! threads. Everything found becomes a [`GapSignal`] for the triage
//! stage; no language calls happen here.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::Memory;
use crate::storage::ContentStore;

// ============================================================================
// SIGNAL TYPES
// ============================================================================

/// What kind of gap a signal describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    StaleGoal,
    ApproachingDeadline,
    BehaviorAnomaly,
    UnresolvedThread,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::StaleGoal => "stale_goal",
            GapKind::ApproachingDeadline => "approaching_deadline",
            GapKind::BehaviorAnomaly => "behavior_anomaly",
            GapKind::UnresolvedThread => "unresolved_thread",
        }
    }
}

/// Signal severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// One Stage-1 gap signal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSignal {
    pub kind: GapKind,
    pub severity: Severity,
    pub description: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// Configuration for signal collection
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// A goal untouched for this many days is stale
    pub staleness_days: i64,
    /// Deadline warning window in days
    pub warning_window_days: i64,
    /// Daily-rate trend reversal above this fraction is an anomaly
    pub anomaly_threshold: f64,
    /// How far back to scan summaries for unresolved threads
    pub thread_lookback_hours: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            staleness_days: 14,
            warning_window_days: 7,
            anomaly_threshold: 0.15,
            thread_lookback_hours: 24,
        }
    }
}

// ============================================================================
// GOAL DEADLINE CHECKER
// ============================================================================

/// Graded deadline urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Overdue,
    Urgent,
    Warning,
    NotApproaching,
}

/// View over a goal memory (goal-subsystem metadata convention)
#[derive(Debug, Clone)]
pub struct GoalView {
    pub memory_id: String,
    pub title: String,
    pub due_date_ms: Option<i64>,
    pub updated_ms: i64,
}

/// Active goals for a user: goal-flagged latest memories whose status
/// is not completed.
pub fn active_goals(store: &ContentStore, user_id: &str) -> Result<Vec<GoalView>> {
    let memories = store.latest_memories(user_id)?;
    Ok(memories
        .iter()
        .filter(|memory| memory.is_goal())
        .filter(|memory| memory.meta_str("status").unwrap_or("active") == "active")
        .map(goal_view)
        .collect())
}

fn goal_view(memory: &Memory) -> GoalView {
    GoalView {
        memory_id: memory.id.clone(),
        title: memory
            .meta_str("title")
            .unwrap_or(&memory.content)
            .to_string(),
        due_date_ms: memory.meta_i64("dueDate"),
        updated_ms: memory.updated_at.timestamp_millis(),
    }
}

/// Whole days until the due date (floor; negative when past).
pub fn days_remaining(due_date_ms: i64, now_ms: i64) -> i64 {
    ((due_date_ms - now_ms) as f64 / 86_400_000.0).floor() as i64
}

/// Grade a deadline.
pub fn goal_urgency(days_remaining: i64, warning_window_days: i64) -> Urgency {
    if days_remaining <= 0 {
        Urgency::Overdue
    } else if days_remaining <= 2 {
        Urgency::Urgent
    } else if days_remaining <= warning_window_days {
        Urgency::Warning
    } else {
        Urgency::NotApproaching
    }
}

/// Fixed notification templates for deadline checks.
pub fn deadline_message(title: &str, days_remaining: i64) -> String {
    if days_remaining <= 0 {
        format!(
            "Goal approaching deadline: {title} — overdue by {} days",
            -days_remaining
        )
    } else {
        format!("Goal approaching deadline: {title} — due in {days_remaining} days")
    }
}

// ============================================================================
// SIGNAL COLLECTION
// ============================================================================

const THREAD_MARKERS: &[&str] = &[
    "unresolved",
    "follow up",
    "to be continued",
    "didn't finish",
    "left off",
    "next time",
];

/// Collect all Stage-1 signals for a user.
pub fn collect_signals(
    store: &ContentStore,
    user_id: &str,
    now_ms: i64,
    config: &SignalConfig,
) -> Result<Vec<GapSignal>> {
    let mut signals = Vec::new();

    // Goal staleness and deadline urgency
    for goal in active_goals(store, user_id)? {
        let idle_days = (now_ms - goal.updated_ms) / 86_400_000;
        if idle_days >= config.staleness_days {
            signals.push(GapSignal {
                kind: GapKind::StaleGoal,
                severity: Severity::Medium,
                description: format!(
                    "Goal \"{}\" has had no update in {idle_days} days",
                    goal.title
                ),
                context: goal.title.clone(),
                source_id: Some(goal.memory_id.clone()),
            });
        }
        if let Some(due) = goal.due_date_ms {
            let remaining = days_remaining(due, now_ms);
            let urgency = goal_urgency(remaining, config.warning_window_days);
            let severity = match urgency {
                Urgency::Overdue | Urgency::Urgent => Severity::High,
                Urgency::Warning => Severity::Medium,
                Urgency::NotApproaching => continue,
            };
            signals.push(GapSignal {
                kind: GapKind::ApproachingDeadline,
                severity,
                description: deadline_message(&goal.title, remaining),
                context: goal.title.clone(),
                source_id: Some(goal.memory_id),
            });
        }
    }

    // Behavioral anomaly: daily-rate trend reversal
    if let Some(patterns) = store.get_patterns(user_id)? {
        let trend = patterns.daily_rate_trend();
        if trend.abs() > config.anomaly_threshold {
            let direction = if trend < 0.0 { "dropped" } else { "spiked" };
            signals.push(GapSignal {
                kind: GapKind::BehaviorAnomaly,
                severity: Severity::Medium,
                description: format!(
                    "Message frequency {direction} by {:.0}% against the recent baseline",
                    trend.abs() * 100.0
                ),
                context: format!("dailyRate {:.2}", patterns.daily_rate),
                source_id: None,
            });
        }
    }

    // Unresolved threads in recent session summaries
    let since = Utc::now() - ChronoDuration::hours(config.thread_lookback_hours);
    for summary in store.recent_session_summaries(user_id, since)? {
        let lowered = summary.summary.to_lowercase();
        if THREAD_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            signals.push(GapSignal {
                kind: GapKind::UnresolvedThread,
                severity: Severity::Low,
                description: format!("Session left an open thread: {}", summary.summary),
                context: summary.topics.join(", "),
                source_id: Some(summary.session_id),
            });
        }
    }

    Ok(signals)
}

// ============================================================================
// TESTS
// ============================================================================
