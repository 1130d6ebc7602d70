//! Relation Graph and Spreading Activation
//!
//! A derived view over the content store's relation rows: it reads
//! through the store and issues writes through it, holding no edges of
//! its own. Traversal is cycle-safe via a visited set keyed by memory
//! id; seeds are never part of the output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::{timeout, Duration};

use crate::error::{EngineError, Result};
use crate::memory::{Memory, Relation, RelationType};
use crate::providers::{extract_json, CompletionRequest, EmbeddingProvider, LanguageProvider};
use crate::retrieval::cosine_similarity;
use crate::storage::ContentStore;

// ============================================================================
// ACTIVATION CONFIG
// ============================================================================

/// Parameters for one spreading-activation run
#[derive(Debug, Clone)]
pub struct ActivationConfig {
    /// Maximum propagation steps
    pub max_steps: usize,
    /// Per-step attenuation; step s multiplies by decay_factor^s
    pub decay_factor: f64,
    /// Gaussian noise standard deviation (0 = deterministic)
    pub noise_sigma: f64,
    /// Nodes below this activation stop propagating
    pub activation_threshold: f64,
    /// Nodes below this activation are excluded from the result
    pub result_threshold: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl ActivationConfig {
    /// Deterministic parameters used by the retrieval pipeline.
    pub fn deterministic() -> Self {
        Self {
            max_steps: 3,
            decay_factor: 0.6,
            noise_sigma: 0.0,
            activation_threshold: 0.05,
            result_threshold: 0.1,
        }
    }

    /// Wide, noisy parameters used by the exploration cycle.
    pub fn exploratory() -> Self {
        Self {
            max_steps: 4,
            decay_factor: 0.4,
            noise_sigma: 0.6,
            activation_threshold: 0.02,
            result_threshold: 0.05,
        }
    }
}

/// One activated node in a spreading-activation result
#[derive(Debug, Clone)]
pub struct ActivatedMemory {
    pub id: String,
    pub activation: f64,
}

/// Box-Muller sample from N(0, sigma).
fn gaussian(rng: &mut StdRng, sigma: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

// ============================================================================
// RELATION DETECTION CONFIG
// ============================================================================

/// Parameters for ingest-time relation detection
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// How many vector neighbors to consider
    pub top_k: usize,
    /// Minimum cosine similarity for a neighbor to be considered
    pub extend_threshold: f32,
    /// Judgments below this confidence are discarded
    pub min_confidence: f64,
    /// Per-call language budget
    pub timeout_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            extend_threshold: 0.75,
            min_confidence: 0.3,
            timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// RELATION GRAPH
// ============================================================================

/// Derived graph view over the content store
pub struct RelationGraph {
    store: Arc<ContentStore>,
}

impl RelationGraph {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }

    /// Spreading activation from `seeds` (id -> initial energy).
    ///
    /// Each step distributes activation along outgoing and incoming
    /// edges, attenuated by edge confidence and `decay_factor^step`,
    /// with optional Gaussian noise. Nodes falling below the activation
    /// threshold are dropped; a node visited above threshold is never
    /// revisited in the same run. Seeds never appear in the output.
    pub fn spread(
        &self,
        seeds: &[(String, f64)],
        config: &ActivationConfig,
        mut rng: Option<&mut StdRng>,
    ) -> Result<Vec<ActivatedMemory>> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let seed_ids: HashSet<&str> = seeds.iter().map(|(id, _)| id.as_str()).collect();
        let mut visited: HashSet<String> = seeds.iter().map(|(id, _)| id.clone()).collect();
        let mut active: HashMap<String, f64> = seeds.iter().cloned().collect();
        let mut accumulated: HashMap<String, f64> = HashMap::new();

        for step in 1..=config.max_steps {
            let attenuation = config.decay_factor.powi(step as i32);
            let mut next: HashMap<String, f64> = HashMap::new();

            for (node_id, energy) in &active {
                for edge in self.store.relations_for(node_id)? {
                    let Some(neighbor) = edge.other_end(node_id) else {
                        continue;
                    };
                    if seed_ids.contains(neighbor) || visited.contains(neighbor) {
                        continue;
                    }
                    let contribution = energy * edge.confidence * attenuation;
                    *next.entry(neighbor.to_string()).or_insert(0.0) += contribution;
                }
            }

            if let Some(rng) = rng.as_deref_mut() {
                if config.noise_sigma > 0.0 {
                    for activation in next.values_mut() {
                        *activation = (*activation + gaussian(rng, config.noise_sigma)).max(0.0);
                    }
                }
            }

            next.retain(|_, activation| *activation >= config.activation_threshold);
            if next.is_empty() {
                break;
            }
            for (node_id, activation) in &next {
                visited.insert(node_id.clone());
                let slot = accumulated.entry(node_id.clone()).or_insert(0.0);
                if *activation > *slot {
                    *slot = *activation;
                }
            }
            active = next;
        }

        let mut results: Vec<ActivatedMemory> = accumulated
            .into_iter()
            .filter(|(_, activation)| *activation >= config.result_threshold)
            .map(|(id, activation)| ActivatedMemory { id, activation })
            .collect();
        results.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(results)
    }

    /// Ingest-time relation detection: find vector neighbors above the
    /// extend threshold and ask the language provider to classify each
    /// pair. Per-neighbor failures are skipped; the call uses the
    /// already-persisted memory id so relation writes arriving after
    /// further ingests stay correct.
    pub async fn detect_relations(
        &self,
        memory: &Memory,
        embedder: &dyn EmbeddingProvider,
        language: &dyn LanguageProvider,
        config: &DetectionConfig,
    ) -> Result<Vec<Relation>> {
        let query = match &memory.embedding {
            Some(embedding) => embedding.clone(),
            None => embedder.embed(&memory.content).await?,
        };

        let candidates = self.store.latest_memories(&memory.user_id)?;
        let mut neighbors: Vec<(&Memory, f32)> = candidates
            .iter()
            .filter(|candidate| candidate.id != memory.id)
            .filter_map(|candidate| {
                candidate
                    .embedding
                    .as_deref()
                    .map(|embedding| (candidate, cosine_similarity(&query, embedding)))
            })
            .filter(|(_, similarity)| *similarity >= config.extend_threshold)
            .collect();
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(config.top_k);

        let mut detected = Vec::new();
        for (neighbor, similarity) in neighbors {
            match self
                .classify_pair(memory, neighbor, similarity, language, config)
                .await
            {
                Ok(Some(relation)) => detected.push(relation),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        "relation detection failed for ({}, {}): {}",
                        memory.id,
                        neighbor.id,
                        error
                    );
                }
            }
        }
        Ok(detected)
    }

    async fn classify_pair(
        &self,
        memory: &Memory,
        neighbor: &Memory,
        similarity: f32,
        language: &dyn LanguageProvider,
        config: &DetectionConfig,
    ) -> Result<Option<Relation>> {
        let system = "You classify how a new memory relates to an existing one. \
            Reply with a JSON object: {\"type\": \"UPDATES\" | \"EXTENDS\" | \"NONE\", \
            \"confidence\": 0.0-1.0}. \
            UPDATES means the new memory replaces the old fact; EXTENDS means it adds \
            detail; NONE means they are unrelated.";
        let user = format!(
            "New memory: {}\nExisting memory: {}\nVector similarity: {:.2}",
            memory.content, neighbor.content, similarity
        );
        let request = CompletionRequest::single_turn(system, user).with_max_tokens(128);

        let completion = timeout(
            Duration::from_millis(config.timeout_ms),
            language.complete(request),
        )
        .await
        .map_err(|_| {
            EngineError::Capability(crate::providers::ProviderError::Timeout(config.timeout_ms))
        })??;

        let Some(judgment) = extract_json(&completion.text()) else {
            return Ok(None);
        };
        let relation_type = judgment
            .get("type")
            .and_then(|value| value.as_str())
            .and_then(RelationType::parse_name);
        let confidence = judgment
            .get("confidence")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);

        match relation_type {
            Some(relation_type) if confidence >= config.min_confidence => {
                let relation =
                    self.store
                        .add_relation(&memory.id, &neighbor.id, relation_type, confidence)?;
                Ok(Some(relation))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
