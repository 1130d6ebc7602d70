//! Gardener Orchestrator
//!
//! Runs the tiered maintenance cycles:
//!
//! - **light** (minutes): full decay pass, scheduled-item consolidation
//! - **deep** (hourly): decay if stale, daytime fusion, gap pipeline,
//!   scheduler sweep
//! - **sleep** (quiet hours): utility archival, NREM fusion, REM
//!   exploration, reflection + SOUL.md, trust refresh
//!
//! Components run in declared order; a failure in one logs and
//! continues, never aborting the cycle. Each tick records a
//! `gardener_runs` row.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::board::{is_quiet_hours, EngagementConfig, EngagementTracker, Scheduler, SchedulerConfig};
use crate::decay::{DecayConfig, DecayEngine};
use crate::error::Result;
use crate::exploration::{ExplorationConfig, ExplorationEngine};
use crate::fusion::{FusionConfig, FusionEngine, FusionMode};
use crate::gaps::{GapConfig, GapPipeline};
use crate::providers::{ChannelAdapter, LanguageProvider, SkillRunner};
use crate::reflection::{ReflectionConfig, ReflectionEngine};
use crate::storage::{ContentStore, GardenerRunRecord};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the gardener
#[derive(Debug, Clone)]
pub struct GardenerConfig {
    /// Light tick cadence
    pub light_interval_ms: u64,
    /// Deep tick cadence
    pub deep_interval_ms: u64,
    /// How often to check whether a sleep tick should run
    pub sleep_check_interval_ms: u64,
    /// Deep tick re-runs decay only when the last pass is older than this
    pub decay_stale_after_ms: i64,
    /// Word-overlap threshold for scheduled-item consolidation
    pub dedup_threshold: f64,
    pub decay: DecayConfig,
    pub fusion: FusionConfig,
    pub exploration: ExplorationConfig,
    pub reflection: ReflectionConfig,
    pub gaps: GapConfig,
    pub scheduler: SchedulerConfig,
    pub engagement: EngagementConfig,
}

impl Default for GardenerConfig {
    fn default() -> Self {
        Self {
            light_interval_ms: 300_000,
            deep_interval_ms: 3_600_000,
            sleep_check_interval_ms: 1_800_000,
            decay_stale_after_ms: 45 * 60_000,
            dedup_threshold: 0.8,
            decay: DecayConfig::default(),
            fusion: FusionConfig::default(),
            exploration: ExplorationConfig::default(),
            reflection: ReflectionConfig::default(),
            gaps: GapConfig::default(),
            scheduler: SchedulerConfig::default(),
            engagement: EngagementConfig::default(),
        }
    }
}

// ============================================================================
// GARDENER
// ============================================================================

/// The gardener
pub struct Gardener {
    store: Arc<ContentStore>,
    decay: DecayEngine,
    fusion: Option<FusionEngine>,
    exploration: Option<ExplorationEngine>,
    reflection: Option<ReflectionEngine>,
    gaps: Option<GapPipeline>,
    scheduler: Arc<Scheduler>,
    engagement: EngagementTracker,
    config: GardenerConfig,
}

impl Gardener {
    /// Wire up the cycles. Language-dependent components are simply
    /// absent when no language provider is configured.
    pub fn new(
        store: Arc<ContentStore>,
        language: Option<Arc<dyn LanguageProvider>>,
        channel: Option<Arc<dyn ChannelAdapter>>,
        runner: Option<Arc<dyn SkillRunner>>,
        config: GardenerConfig,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            channel,
            runner,
            config.scheduler.clone(),
        ));
        let engagement = EngagementTracker::new(store.clone(), config.engagement.clone());
        let (fusion, exploration, reflection, gaps) = match &language {
            Some(language) => (
                Some(FusionEngine::new(
                    store.clone(),
                    language.clone(),
                    config.fusion.clone(),
                )),
                Some(ExplorationEngine::new(
                    store.clone(),
                    language.clone(),
                    config.exploration.clone(),
                )),
                Some(ReflectionEngine::new(
                    store.clone(),
                    language.clone(),
                    config.reflection.clone(),
                )),
                Some(GapPipeline::new(
                    store.clone(),
                    language.clone(),
                    config.gaps.clone(),
                )),
            ),
            None => (None, None, None, None),
        };
        Self {
            store,
            decay: DecayEngine::with_config(config.decay.clone()),
            fusion,
            exploration,
            reflection,
            gaps,
            scheduler,
            engagement,
            config,
        }
    }

    /// The scheduler handle, for spawning its own sweep timer.
    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    fn decay_pass(&self, now_ms: i64, record: &mut GardenerRunRecord) {
        match self.store.memories_for_decay() {
            Ok(memories) => {
                let plan = self.decay.plan_batch(&memories, now_ms);
                let updates: Vec<(String, f64)> = plan
                    .into_iter()
                    .map(|update| (update.id, update.prominence))
                    .collect();
                match self.store.set_prominences(&updates) {
                    Ok(applied) => record.memories_decayed += applied as i64,
                    Err(error) => {
                        record.failures += 1;
                        tracing::warn!("decay apply failed: {error}");
                    }
                }
            }
            Err(error) => {
                record.failures += 1;
                tracing::warn!("decay read failed: {error}");
            }
        }
    }

    fn users(&self) -> Vec<String> {
        match self.store.list_users() {
            Ok(users) => users,
            Err(error) => {
                tracing::warn!("user listing failed: {error}");
                Vec::new()
            }
        }
    }

    /// Light tick: full decay plus scheduled-item consolidation.
    pub async fn run_light_tick(&self, now_ms: i64) -> Result<GardenerRunRecord> {
        let started = Instant::now();
        let mut record = GardenerRunRecord {
            tier: "light".to_string(),
            ..Default::default()
        };

        self.decay_pass(now_ms, &mut record);

        for user_id in self.users() {
            match self
                .store
                .consolidate_pending_items(&user_id, self.config.dedup_threshold)
            {
                Ok(removed) => record.items_consolidated += removed as i64,
                Err(error) => {
                    record.failures += 1;
                    tracing::warn!("item consolidation failed for {user_id}: {error}");
                }
            }
        }

        record.duration_ms = started.elapsed().as_millis() as i64;
        self.store.record_gardener_run(&record)?;
        Ok(record)
    }

    /// Deep tick: decay if stale, daytime fusion, gap pipeline,
    /// scheduler sweep.
    pub async fn run_deep_tick(&self, now_ms: i64) -> Result<GardenerRunRecord> {
        let started = Instant::now();
        let mut record = GardenerRunRecord {
            tier: "deep".to_string(),
            ..Default::default()
        };

        let decay_is_stale = match self.store.last_gardener_run("light") {
            Ok(Some(last)) => now_ms - last.timestamp_millis() > self.config.decay_stale_after_ms,
            Ok(None) => true,
            Err(_) => true,
        };
        if decay_is_stale {
            self.decay_pass(now_ms, &mut record);
        }

        for user_id in self.users() {
            if let Some(fusion) = &self.fusion {
                match fusion.run(&user_id, FusionMode::Daytime).await {
                    Ok(report) => {
                        record.clusters_fused += report.clusters_fused as i64;
                        record.failures += report.failures as i64;
                    }
                    Err(error) => {
                        record.failures += 1;
                        tracing::warn!("daytime fusion failed for {user_id}: {error}");
                    }
                }
            }
            if let Some(gaps) = &self.gaps {
                match gaps.run(&user_id, now_ms).await {
                    Ok(report) => record.gaps_scheduled += report.items_scheduled as i64,
                    Err(error) => {
                        record.failures += 1;
                        tracing::warn!("gap pipeline failed for {user_id}: {error}");
                    }
                }
            }
        }

        match self.scheduler.evaluate(now_ms).await {
            Ok(report) => {
                record.items_fired += report.fired as i64;
                record.failures += report.failures as i64;
            }
            Err(error) => {
                record.failures += 1;
                tracing::warn!("scheduler sweep failed: {error}");
            }
        }

        record.duration_ms = started.elapsed().as_millis() as i64;
        self.store.record_gardener_run(&record)?;
        Ok(record)
    }

    /// Sleep tick: utility archival, NREM fusion, REM exploration,
    /// reflection, trust refresh. Per-user components run only for
    /// users currently inside their quiet hours.
    pub async fn run_sleep_tick(&self, now_ms: i64) -> Result<GardenerRunRecord> {
        let started = Instant::now();
        let mut record = GardenerRunRecord {
            tier: "sleep".to_string(),
            ..Default::default()
        };

        match self.store.memories_for_decay() {
            Ok(memories) => {
                let plan = self.decay.utility_archive_plan(&memories);
                match self.store.archive_memories(&plan) {
                    Ok(archived) => record.memories_archived += archived as i64,
                    Err(error) => {
                        record.failures += 1;
                        tracing::warn!("utility archival failed: {error}");
                    }
                }
            }
            Err(error) => {
                record.failures += 1;
                tracing::warn!("utility archival read failed: {error}");
            }
        }

        for user_id in self.users() {
            let timezone = self
                .store
                .get_patterns(&user_id)
                .ok()
                .flatten()
                .and_then(|patterns| patterns.timezone);
            if !is_quiet_hours(now_ms, timezone.as_deref(), &self.config.scheduler) {
                continue;
            }

            if let Some(fusion) = &self.fusion {
                match fusion.run(&user_id, FusionMode::Sleep).await {
                    Ok(report) => {
                        record.clusters_fused += report.clusters_fused as i64;
                        record.failures += report.failures as i64;
                    }
                    Err(error) => {
                        record.failures += 1;
                        tracing::warn!("NREM fusion failed for {user_id}: {error}");
                    }
                }
            }
            if let Some(exploration) = &self.exploration {
                match exploration.run(&user_id, None).await {
                    Ok(report) => {
                        record.relations_minted += report.relations_minted as i64;
                        record.failures += report.failures as i64;
                    }
                    Err(error) => {
                        record.failures += 1;
                        tracing::warn!("REM exploration failed for {user_id}: {error}");
                    }
                }
            }
            if let Err(error) = self.engagement.refresh_dial(&user_id, now_ms) {
                record.failures += 1;
                tracing::warn!("trust refresh failed for {user_id}: {error}");
            }
        }

        if let Some(reflection) = &self.reflection {
            match reflection.run().await {
                Ok(report) => {
                    record.insights_written += report.insights_written as i64;
                    record.failures += report.failures as i64;
                }
                Err(error) => {
                    record.failures += 1;
                    tracing::warn!("reflection failed: {error}");
                }
            }
        }

        record.duration_ms = started.elapsed().as_millis() as i64;
        self.store.record_gardener_run(&record)?;
        Ok(record)
    }

    /// Spawn the three timer loops. Ticks within one cycle run
    /// sequentially; different cycles run on separate tasks.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let light = self.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                light.config.light_interval_ms,
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                if let Err(error) = light.run_light_tick(now_ms).await {
                    tracing::warn!("light tick failed: {error}");
                }
            }
        }));

        let deep = self.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                deep.config.deep_interval_ms,
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                if let Err(error) = deep.run_deep_tick(now_ms).await {
                    tracing::warn!("deep tick failed: {error}");
                }
            }
        }));

        let sleep = self;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                sleep.config.sleep_check_interval_ms,
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                if let Err(error) = sleep.run_sleep_tick(now_ms).await {
                    tracing::warn!("sleep tick failed: {error}");
                }
            }
        }));

        handles
    }
}

// ============================================================================
// TESTS
// ============================================================================
