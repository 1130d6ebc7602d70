//! Exploration Engine (REM)
//!
//! Discovers novel cross-memory relations the heuristics missed:
//! stochastic seed sampling weighted by importance x prominence, noisy
//! spreading activation, then a language-model judge that either
//! describes the connection or answers NO_CONNECTION. Accepted
//! judgments are persisted as EXTENDS edges.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{timeout, Duration};

use crate::error::Result;
use crate::graph::{ActivationConfig, RelationGraph};
use crate::memory::{Memory, MemoryCategory, RelationType};
use crate::providers::{extract_json, CompletionRequest, LanguageProvider, ProviderError};
use crate::storage::ContentStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the exploration engine
#[derive(Debug, Clone)]
pub struct ExplorationConfig {
    /// Seeds sampled per run
    pub max_seeds: usize,
    /// Diversity cap: at most this many seeds per category
    pub per_category_cap: usize,
    /// Gaussian noise added to sampling weights so the same seeds
    /// don't always win
    pub weight_noise_sigma: f64,
    /// Candidate pairs judged per seed
    pub max_pairs_per_seed: usize,
    /// Minimum mean of (novelty, plausibility, usefulness) to accept
    pub min_mean_score: f64,
    /// Noisy traversal parameters
    pub activation: ActivationConfig,
    /// Per-judgment language budget
    pub timeout_ms: u64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            max_seeds: 5,
            per_category_cap: 2,
            weight_noise_sigma: 0.05,
            max_pairs_per_seed: 3,
            min_mean_score: 3.0,
            activation: ActivationConfig::exploratory(),
            timeout_ms: 30_000,
        }
    }
}

/// Outcome counters for one exploration run
#[derive(Debug, Clone, Default)]
pub struct ExplorationReport {
    pub seeds_sampled: usize,
    pub pairs_judged: usize,
    pub relations_minted: usize,
    pub failures: usize,
}

/// The literal token the judge uses to decline a pair
const NO_CONNECTION: &str = "NO_CONNECTION";

// ============================================================================
// EXPLORATION ENGINE
// ============================================================================

/// The exploration engine
pub struct ExplorationEngine {
    store: Arc<ContentStore>,
    language: Arc<dyn LanguageProvider>,
    graph: RelationGraph,
    config: ExplorationConfig,
}

impl ExplorationEngine {
    pub fn new(
        store: Arc<ContentStore>,
        language: Arc<dyn LanguageProvider>,
        config: ExplorationConfig,
    ) -> Self {
        let graph = RelationGraph::new(store.clone());
        Self {
            store,
            language,
            graph,
            config,
        }
    }

    /// Run one exploration pass. `rng_seed` pins the stochastic parts
    /// for tests; None draws from the thread RNG.
    pub async fn run(&self, user_id: &str, rng_seed: Option<u64>) -> Result<ExplorationReport> {
        let mut report = ExplorationReport::default();
        if !self.language.is_available() {
            tracing::debug!("exploration skipped: language capability unavailable");
            return Ok(report);
        }
        let mut rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let candidates = self.store.latest_memories(user_id)?;
        if candidates.len() < 2 {
            return Ok(report);
        }
        let by_id: HashMap<&str, &Memory> =
            candidates.iter().map(|memory| (memory.id.as_str(), memory)).collect();

        let seeds = self.sample_seeds(&candidates, &mut rng);
        report.seeds_sampled = seeds.len();

        for seed in seeds {
            let activated = self
                .graph
                .spread(&[(seed.id.clone(), 1.0)], &self.config.activation, Some(&mut rng))?;

            let mut judged_for_seed = 0;
            for node in activated {
                if judged_for_seed >= self.config.max_pairs_per_seed {
                    break;
                }
                let Some(candidate) = by_id.get(node.id.as_str()) else {
                    continue;
                };
                // Already directly related pairs bring nothing new
                if self.store.has_relation(&seed.id, &candidate.id)? {
                    continue;
                }
                judged_for_seed += 1;
                report.pairs_judged += 1;
                match self.judge_pair(&seed, candidate).await {
                    Ok(Some(confidence)) => {
                        self.store.add_relation(
                            &seed.id,
                            &candidate.id,
                            RelationType::Extends,
                            confidence,
                        )?;
                        report.relations_minted += 1;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        report.failures += 1;
                        tracing::warn!(
                            "exploration judgment failed for ({}, {}): {}",
                            seed.id,
                            candidate.id,
                            error
                        );
                    }
                }
            }
        }
        Ok(report)
    }

    /// Importance x prominence weighted sampling with per-category caps
    /// and low-amplitude Gaussian noise on the weights.
    fn sample_seeds(&self, candidates: &[Memory], rng: &mut StdRng) -> Vec<Memory> {
        let mut weighted: Vec<(f64, &Memory)> = candidates
            .iter()
            .map(|memory| {
                let noise = if self.config.weight_noise_sigma > 0.0 {
                    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                    let u2: f64 = rng.gen_range(0.0..1.0);
                    self.config.weight_noise_sigma
                        * (-2.0 * u1.ln()).sqrt()
                        * (2.0 * std::f64::consts::PI * u2).cos()
                } else {
                    0.0
                };
                let weight = (memory.importance as f64 / 10.0) * memory.prominence + noise;
                (weight, memory)
            })
            .collect();
        weighted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut per_category: HashMap<MemoryCategory, usize> = HashMap::new();
        let mut seeds = Vec::new();
        for (_, memory) in weighted {
            if seeds.len() >= self.config.max_seeds {
                break;
            }
            let count = per_category.entry(memory.category).or_insert(0);
            if *count >= self.config.per_category_cap {
                continue;
            }
            *count += 1;
            seeds.push(memory.clone());
        }
        seeds
    }

    /// Ask the judge to score a pair. Returns the reported confidence
    /// when accepted, None when declined.
    async fn judge_pair(&self, seed: &Memory, candidate: &Memory) -> Result<Option<f64>> {
        let system = "You judge whether two memories about a user share a non-obvious \
            connection. Reply with a JSON object: {\"novelty\": 1-5, \"plausibility\": 1-5, \
            \"usefulness\": 1-5, \"connection\": \"one sentence\" or \"NO_CONNECTION\", \
            \"confidence\": 0.0-1.0}.";
        let user = format!(
            "Memory A: {}\nMemory B: {}",
            seed.content, candidate.content
        );
        let request = CompletionRequest::single_turn(system, user)
            .with_temperature(0.7)
            .with_max_tokens(256);

        let completion = timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.language.complete(request),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.timeout_ms))??;

        let parsed = extract_json(&completion.text())
            .ok_or_else(|| ProviderError::Model("unparseable judgment".to_string()))?;

        let connection = parsed
            .get("connection")
            .and_then(|value| value.as_str())
            .unwrap_or(NO_CONNECTION);
        if connection.trim().is_empty() || connection.contains(NO_CONNECTION) {
            return Ok(None);
        }

        let mut total = 0.0;
        for key in ["novelty", "plausibility", "usefulness"] {
            total += parsed
                .get(key)
                .and_then(|value| value.as_f64())
                .ok_or_else(|| {
                    ProviderError::Model(format!("judgment missing {key} score"))
                })?;
        }
        if total / 3.0 < self.config.min_mean_score {
            return Ok(None);
        }

        let confidence = parsed
            .get("confidence")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        Ok(Some(confidence))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDraft;
    use crate::providers::Completion;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct ScriptedJudge {
        reply: String,
    }

    #[async_trait]
    impl LanguageProvider for ScriptedJudge {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<Completion, ProviderError> {
            Ok(Completion::from_text(self.reply.clone()))
        }
    }

    fn open_store() -> (TempDir, Arc<ContentStore>) {
        let dir = TempDir::new().unwrap();
        let store =
            Arc::new(ContentStore::new(Some(dir.path().join("engram.db"))).unwrap());
        (dir, store)
    }

    /// A -> B -> C chain: A and C have no direct relation, so C is the
    /// only novel pair reachable from seed A.
    fn seed_chain(store: &ContentStore) -> (String, String, String) {
        let a = store
            .add_memory(MemoryDraft::new("u1", "runs every morning").with_importance(9))
            .unwrap();
        let b = store
            .add_memory(MemoryDraft::new("u1", "training for a marathon").with_importance(5))
            .unwrap();
        let c = store
            .add_memory(MemoryDraft::new("u1", "buys expensive running shoes").with_importance(5))
            .unwrap();
        store
            .add_relation(&a.id, &b.id, RelationType::Extends, 0.9)
            .unwrap();
        store
            .add_relation(&b.id, &c.id, RelationType::Extends, 0.9)
            .unwrap();
        (a.id, b.id, c.id)
    }

    fn quiet_config() -> ExplorationConfig {
        // Deterministic traversal so assertions are stable
        let mut activation = ActivationConfig::exploratory();
        activation.noise_sigma = 0.0;
        ExplorationConfig {
            activation,
            weight_noise_sigma: 0.0,
            ..Default::default()
        }
    }

    const ACCEPT: &str = r#"{"novelty":4,"plausibility":4,"usefulness":3,"connection":"Running habit explains the shoe spending","confidence":0.8}"#;
    const DECLINE: &str = r#"{"novelty":1,"plausibility":1,"usefulness":1,"connection":"NO_CONNECTION","confidence":0.9}"#;
    const LOW_SCORES: &str = r#"{"novelty":2,"plausibility":2,"usefulness":2,"connection":"Maybe related","confidence":0.9}"#;

    #[tokio::test]
    async fn test_mints_novel_relation() {
        let (_dir, store) = open_store();
        let (a, _b, c) = seed_chain(&store);
        let engine = ExplorationEngine::new(
            store.clone(),
            Arc::new(ScriptedJudge {
                reply: ACCEPT.to_string(),
            }),
            quiet_config(),
        );

        let report = engine.run("u1", Some(42)).await.unwrap();
        assert!(report.relations_minted >= 1);
        assert!(store.has_relation(&a, &c).unwrap());
        // Minted edge carries the judge's confidence
        let edge = store
            .relations_for(&a)
            .unwrap()
            .into_iter()
            .find(|relation| relation.connects(&a, &c))
            .unwrap();
        assert_eq!(edge.relation_type, RelationType::Extends);
        assert!((edge.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_connection_declined() {
        let (_dir, store) = open_store();
        let (a, _b, c) = seed_chain(&store);
        let engine = ExplorationEngine::new(
            store.clone(),
            Arc::new(ScriptedJudge {
                reply: DECLINE.to_string(),
            }),
            quiet_config(),
        );

        let report = engine.run("u1", Some(42)).await.unwrap();
        assert_eq!(report.relations_minted, 0);
        assert!(!store.has_relation(&a, &c).unwrap());
    }

    #[tokio::test]
    async fn test_mean_score_gate() {
        let (_dir, store) = open_store();
        let (a, _b, c) = seed_chain(&store);
        let engine = ExplorationEngine::new(
            store.clone(),
            Arc::new(ScriptedJudge {
                reply: LOW_SCORES.to_string(),
            }),
            quiet_config(),
        );

        let report = engine.run("u1", Some(42)).await.unwrap();
        assert!(report.pairs_judged >= 1);
        assert_eq!(report.relations_minted, 0);
        assert!(!store.has_relation(&a, &c).unwrap());
    }

    #[tokio::test]
    async fn test_unparseable_judgment_is_failure_not_abort() {
        let (_dir, store) = open_store();
        seed_chain(&store);
        let engine = ExplorationEngine::new(
            store.clone(),
            Arc::new(ScriptedJudge {
                reply: "hmm, interesting pair".to_string(),
            }),
            quiet_config(),
        );

        let report = engine.run("u1", Some(42)).await.unwrap();
        assert!(report.failures >= 1);
        assert_eq!(report.relations_minted, 0);
    }

    #[tokio::test]
    async fn test_category_cap_diversifies_seeds() {
        let (_dir, store) = open_store();
        for index in 0..6 {
            store
                .add_memory(
                    MemoryDraft::new("u1", format!("preference number {index}"))
                        .with_category(MemoryCategory::Preference)
                        .with_importance(10),
                )
                .unwrap();
        }
        store
            .add_memory(
                MemoryDraft::new("u1", "a single fact")
                    .with_category(MemoryCategory::Fact)
                    .with_importance(1),
            )
            .unwrap();

        let engine = ExplorationEngine::new(
            store.clone(),
            Arc::new(ScriptedJudge {
                reply: DECLINE.to_string(),
            }),
            quiet_config(),
        );
        let candidates = store.latest_memories("u1").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let seeds = engine.sample_seeds(&candidates, &mut rng);
        let preference_count = seeds
            .iter()
            .filter(|memory| memory.category == MemoryCategory::Preference)
            .count();
        assert!(preference_count <= 2);
        // The low-importance fact still gets a slot thanks to the cap
        assert!(seeds.iter().any(|memory| memory.category == MemoryCategory::Fact));
    }
}
