//! Decay Engine
//!
//! Computes per-memory prominence from four weighted factors: document
//! age, access frequency, recency of access, and semantic importance.
//! Pure and total - the engine never errors; the store applies its
//! batch output in a single transaction.

use crate::memory::{Memory, MemoryCategory, MemoryKind};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Daily retention rates per memory kind.
///
/// `dec_rate = max(kind_rate, category_rate)` - the slower-decaying
/// dimension wins.
#[derive(Debug, Clone)]
pub struct KindRates {
    pub dynamic_profile: f64,
    pub regular: f64,
    pub derived: f64,
    pub superseded: f64,
}

impl Default for KindRates {
    fn default() -> Self {
        Self {
            dynamic_profile: 0.98,
            regular: 0.90,
            derived: 0.95,
            superseded: 0.85,
        }
    }
}

/// Daily retention rates per category. Defaults keep the half-life
/// ordering event < fact < preference < relationship.
#[derive(Debug, Clone)]
pub struct CategoryRates {
    pub preference: f64,
    pub fact: f64,
    pub event: f64,
    pub relationship: f64,
    pub insight: f64,
}

impl Default for CategoryRates {
    fn default() -> Self {
        Self {
            event: 0.90,
            fact: 0.95,
            insight: 0.96,
            preference: 0.97,
            relationship: 0.98,
        }
    }
}

/// Configuration for the decay engine
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Weight of the age-decay factor
    pub age_weight: f64,
    /// Weight of the access-frequency factor
    pub access_weight: f64,
    /// Weight of the recency-of-access factor
    pub recency_weight: f64,
    /// Weight of the semantic-importance factor
    pub importance_weight: f64,
    /// Per-kind daily retention rates
    pub kind_rates: KindRates,
    /// Per-category daily retention rates
    pub category_rates: CategoryRates,
    /// Batch passes emit only changes above this magnitude
    pub delta_threshold: f64,
    /// Cap on utility-based archivals per pass
    pub max_utility_archive: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            age_weight: 0.30,
            access_weight: 0.25,
            recency_weight: 0.25,
            importance_weight: 0.20,
            kind_rates: KindRates::default(),
            category_rates: CategoryRates::default(),
            delta_threshold: 0.01,
            max_utility_archive: 50,
        }
    }
}

// ============================================================================
// PROMINENCE BANDS
// ============================================================================

/// Prominence band thresholds: ACTIVE >= 0.5, DORMANT in [0.1, 0.5),
/// ARCHIVED < 0.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProminenceBand {
    Active,
    Dormant,
    Archived,
}

pub const ACTIVE_THRESHOLD: f64 = 0.5;
pub const DORMANT_FLOOR: f64 = 0.1;

/// Classify a prominence value into its band.
pub fn band(prominence: f64) -> ProminenceBand {
    if prominence >= ACTIVE_THRESHOLD {
        ProminenceBand::Active
    } else if prominence >= DORMANT_FLOOR {
        ProminenceBand::Dormant
    } else {
        ProminenceBand::Archived
    }
}

/// Prominence of a freshly created memory: the decay formula evaluated
/// at age zero with no accesses. The store uses this at insert; every
/// later value comes from the batch pass.
pub fn initial_prominence(kind: MemoryKind, importance: u8) -> f64 {
    if kind == MemoryKind::StaticProfile {
        return 1.0;
    }
    let config = DecayConfig::default();
    let base = config.age_weight
        + config.access_weight
        + config.recency_weight
        + config.importance_weight * (importance as f64 / 10.0);
    base.clamp(0.0, 1.0)
}

// ============================================================================
// DECAY ENGINE
// ============================================================================

/// One planned prominence change
#[derive(Debug, Clone)]
pub struct ProminenceUpdate {
    pub id: String,
    pub prominence: f64,
}

/// The decay engine
#[derive(Debug, Clone, Default)]
pub struct DecayEngine {
    config: DecayConfig,
}

impl DecayEngine {
    pub fn new() -> Self {
        Self {
            config: DecayConfig::default(),
        }
    }

    pub fn with_config(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    fn kind_rate(&self, kind: MemoryKind) -> f64 {
        match kind {
            // Exempt; prominence() short-circuits before this matters
            MemoryKind::StaticProfile => 1.0,
            MemoryKind::DynamicProfile => self.config.kind_rates.dynamic_profile,
            MemoryKind::Regular => self.config.kind_rates.regular,
            MemoryKind::Derived => self.config.kind_rates.derived,
            MemoryKind::Superseded => self.config.kind_rates.superseded,
        }
    }

    fn category_rate(&self, category: MemoryCategory) -> f64 {
        match category {
            MemoryCategory::Preference => self.config.category_rates.preference,
            MemoryCategory::Fact => self.config.category_rates.fact,
            MemoryCategory::Event => self.config.category_rates.event,
            MemoryCategory::Relationship => self.config.category_rates.relationship,
            MemoryCategory::Insight => self.config.category_rates.insight,
        }
    }

    /// Compute prominence for one memory at `now_ms`.
    pub fn prominence(&self, memory: &Memory, now_ms: i64) -> f64 {
        if !memory.decays() {
            return 1.0;
        }

        let dec_rate = self
            .kind_rate(memory.kind)
            .max(self.category_rate(memory.category));
        let age_decay = dec_rate.powf(memory.age_days(now_ms));

        let access_boost = 1.0 + 0.1 * (memory.access_count.min(10) as f64);

        let recency_boost = match memory.last_access_age_days(now_ms) {
            Some(days) => 1.0 + 0.3 * (-days / 7.0).exp(),
            None => 1.0,
        };

        let importance = memory.importance as f64 / 10.0;

        let prominence = self.config.age_weight * age_decay
            + self.config.access_weight * access_boost
            + self.config.recency_weight * recency_boost
            + self.config.importance_weight * importance;

        prominence.clamp(0.0, 1.0)
    }

    /// Utility score used by forgetting: prominence x ln(1 + accesses).
    pub fn utility(&self, memory: &Memory) -> f64 {
        memory.prominence * (1.0 + memory.access_count as f64).ln()
    }

    /// Recompute a batch, emitting only changes with |delta| above the
    /// configured threshold. The caller applies the whole plan in one
    /// transaction.
    pub fn plan_batch(&self, memories: &[Memory], now_ms: i64) -> Vec<ProminenceUpdate> {
        memories
            .iter()
            .filter(|m| m.decays())
            .filter_map(|m| {
                let next = self.prominence(m, now_ms);
                ((next - m.prominence).abs() > self.config.delta_threshold).then(|| {
                    ProminenceUpdate {
                        id: m.id.clone(),
                        prominence: next,
                    }
                })
            })
            .collect()
    }

    /// Second archival pass: the lowest-utility entries in the archive
    /// band, up to the configured cap. Archival itself is a flag
    /// transition performed by the store.
    pub fn utility_archive_plan(&self, memories: &[Memory]) -> Vec<String> {
        let mut archive_band: Vec<(&Memory, f64)> = memories
            .iter()
            .filter(|m| m.decays() && band(m.prominence) == ProminenceBand::Archived)
            .map(|m| (m, self.utility(m)))
            .collect();
        archive_band.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        archive_band
            .into_iter()
            .take(self.config.max_utility_archive)
            .map(|(m, _)| m.id.clone())
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
