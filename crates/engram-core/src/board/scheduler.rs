//! Scheduler - timer-driven firing of due items
//!
//! Sweeps pending items whose trigger has passed: tasks dispatch through
//! the skill runner, nudges deliver through the channel adapter. Quiet
//! hours suppress nudges (the item stays pending and retries next tick).
//! The delivery-time planner maps urgency plus the user's recent
//! active-hours pattern to a concrete trigger timestamp.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::Result;
use crate::memory::{BehavioralPatterns, ItemKind, ItemStatus, Priority, ScheduledItemDraft};
use crate::providers::{ChannelAdapter, SkillRunner};
use crate::storage::ContentStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sweep cadence in milliseconds
    pub tick_ms: u64,
    /// Items processed per sweep (backpressure)
    pub batch_limit: usize,
    /// Quiet hours start (local hour, inclusive)
    pub quiet_start_hour: u32,
    /// Quiet hours end (local hour, exclusive)
    pub quiet_end_hour: u32,
    /// Fired items older than this many days are auto-archived
    pub auto_archive_days: i64,
    /// Pending items overdue by more than this many days expire
    pub expire_horizon_days: i64,
    /// Hour used for "next morning" deliveries
    pub morning_hour: u32,
    /// Fallback active hour when the user has no observed pattern
    pub default_active_hour: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 60_000,
            batch_limit: 32,
            quiet_start_hour: 22,
            quiet_end_hour: 8,
            auto_archive_days: 7,
            expire_horizon_days: 30,
            morning_hour: 9,
            default_active_hour: 10,
        }
    }
}

/// Outcome counters for one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub examined: usize,
    pub fired: usize,
    pub deferred: usize,
    pub failures: usize,
    pub archived: usize,
    pub expired: usize,
}

// ============================================================================
// QUIET HOURS AND THE DELIVERY-TIME PLANNER
// ============================================================================

fn resolve_timezone(timezone: Option<&str>) -> Tz {
    timezone
        .and_then(|name| Tz::from_str(name).ok())
        .unwrap_or(chrono_tz::UTC)
}

fn local_now(now_ms: i64, tz: Tz) -> DateTime<Tz> {
    Utc.timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Utc::now)
        .with_timezone(&tz)
}

/// Whether `hour` falls inside a possibly midnight-wrapping window.
fn hour_in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}

/// Whether `now_ms` falls in the user's quiet hours.
pub fn is_quiet_hours(now_ms: i64, timezone: Option<&str>, config: &SchedulerConfig) -> bool {
    let local = local_now(now_ms, resolve_timezone(timezone));
    hour_in_window(local.hour(), config.quiet_start_hour, config.quiet_end_hour)
}

/// Epoch ms of the next occurrence of `hour:00` local time, strictly
/// after now.
fn next_local_hour(now_ms: i64, tz: Tz, hour: u32) -> i64 {
    let local = local_now(now_ms, tz);
    let mut candidate = local
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| local.naive_local());
    if candidate <= local.naive_local() {
        candidate += ChronoDuration::days(1);
    }
    tz.from_local_datetime(&candidate)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(now_ms + 86_400_000)
}

/// Compute a delivery trigger from urgency and the user's recent
/// active-hours pattern. Urgent fires now; warning/medium waits for the
/// next active window outside quiet hours; low waits for next morning.
pub fn plan_delivery_time(
    priority: Priority,
    patterns: Option<&BehavioralPatterns>,
    now_ms: i64,
    config: &SchedulerConfig,
) -> i64 {
    let timezone = patterns.and_then(|p| p.timezone.as_deref());
    let tz = resolve_timezone(timezone);

    match priority {
        Priority::Urgent => now_ms,
        Priority::Low => next_local_hour(now_ms, tz, config.morning_hour),
        Priority::High | Priority::Medium => {
            // Next active window: the user's most frequent hour that sits
            // outside quiet hours, else the configured default.
            let preferred = patterns
                .map(|p| p.preferred_hours())
                .unwrap_or_default()
                .into_iter()
                .find(|hour| {
                    !hour_in_window(*hour, config.quiet_start_hour, config.quiet_end_hour)
                })
                .unwrap_or(config.default_active_hour);
            if !is_quiet_hours(now_ms, timezone, config)
                && local_now(now_ms, tz).hour() == preferred
            {
                now_ms
            } else {
                next_local_hour(now_ms, tz, preferred)
            }
        }
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// The scheduler
pub struct Scheduler {
    store: Arc<ContentStore>,
    channel: Option<Arc<dyn ChannelAdapter>>,
    runner: Option<Arc<dyn SkillRunner>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<ContentStore>,
        channel: Option<Arc<dyn ChannelAdapter>>,
        runner: Option<Arc<dyn SkillRunner>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            channel,
            runner,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// One sweep: fire due items, respecting quiet hours and the
    /// per-tick batch limit, then auto-archive stale fired items.
    pub async fn evaluate(&self, now_ms: i64) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let due = self.store.due_pending_items(now_ms, self.config.batch_limit)?;

        for item in due {
            report.examined += 1;

            // Items overdue past the long horizon stop retrying
            if now_ms - item.trigger_at > self.config.expire_horizon_days * 86_400_000 {
                self.store
                    .transition_item(&item.id, ItemStatus::Expired, now_ms)?;
                report.expired += 1;
                continue;
            }

            // Quiet hours suppress nudges; the item retries next tick
            if item.kind == ItemKind::Nudge {
                let timezone = self
                    .store
                    .get_patterns(&item.user_id)
                    .ok()
                    .flatten()
                    .and_then(|p| p.timezone);
                if is_quiet_hours(now_ms, timezone.as_deref(), &self.config) {
                    report.deferred += 1;
                    continue;
                }
            }

            self.store
                .transition_item(&item.id, ItemStatus::Processing, now_ms)?;

            let delivered = match (item.kind, self.runner.as_ref()) {
                (ItemKind::Task, Some(runner)) => {
                    self.run_task(&item.id, &item.user_id, &item.message, &item.task_config, runner.clone(), now_ms)
                        .await
                }
                _ => self.deliver_nudge(&item.user_id, &item.message).await,
            };

            if delivered {
                let fired = self
                    .store
                    .transition_item(&item.id, ItemStatus::Fired, now_ms)?;
                report.fired += 1;
                // Recurring items spawn their next occurrence
                if let Some(interval) = fired.recurrence_interval_ms() {
                    let mut next = ScheduledItemDraft::new(&fired.user_id, &fired.message);
                    next.source = fired.source;
                    next.kind = fired.kind;
                    next.item_type = fired.item_type.clone();
                    next.context = fired.context.clone();
                    next.priority = fired.priority;
                    next.recurring = fired.recurring.clone();
                    next.goal_id = fired.goal_id.clone();
                    next.task_config = fired.task_config.clone();
                    next.trigger_at = now_ms + interval;
                    self.store.add_scheduled_item(next)?;
                }
            } else {
                // Delivery failed: back to pending, retry next tick
                self.store
                    .transition_item(&item.id, ItemStatus::Pending, now_ms)?;
                report.failures += 1;
            }
        }

        let cutoff = now_ms - self.config.auto_archive_days * 86_400_000;
        report.archived = self.store.auto_archive_fired_before(cutoff)?;
        Ok(report)
    }

    async fn run_task(
        &self,
        item_id: &str,
        user_id: &str,
        goal: &str,
        task_config: &Option<serde_json::Value>,
        runner: Arc<dyn SkillRunner>,
        now_ms: i64,
    ) -> bool {
        let allowed_tools: Option<Vec<String>> = task_config
            .as_ref()
            .and_then(|config| config.get("allowedTools"))
            .and_then(|value| value.as_array())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            });
        match runner.run(goal, allowed_tools.as_deref()).await {
            Ok(outcome) => {
                let payload = serde_json::json!({
                    "result": outcome.result,
                    "iterations": outcome.iterations,
                });
                if let Err(error) = self.store.set_item_result(item_id, &payload, now_ms) {
                    tracing::warn!("failed to store task result for {item_id}: {error}");
                }
                // Task results also go out through the channel when present
                if let Some(channel) = &self.channel {
                    if let Err(error) = channel.send_message(user_id, &outcome.result).await {
                        tracing::warn!("task result delivery failed for {item_id}: {error}");
                    }
                }
                true
            }
            Err(error) => {
                tracing::warn!("task run failed for {item_id}: {error}");
                false
            }
        }
    }

    async fn deliver_nudge(&self, user_id: &str, message: &str) -> bool {
        let Some(channel) = &self.channel else {
            tracing::debug!("no channel configured, nudge for {user_id} stays pending");
            return false;
        };
        match channel.send_message(user_id, message).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("nudge delivery failed for {user_id}: {error}");
                false
            }
        }
    }

    /// Run the sweep on a timer until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(self.config.tick_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                match self.evaluate(now_ms).await {
                    Ok(report) if report.examined > 0 => {
                        tracing::info!(
                            "scheduler sweep: {} fired, {} deferred, {} failed",
                            report.fired,
                            report.deferred,
                            report.failures
                        );
                    }
                    Ok(_) => {}
                    Err(error) => tracing::warn!("scheduler sweep failed: {error}"),
                }
            }
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
