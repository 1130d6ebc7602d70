//! Retrieval Pipeline
//!
//! Blends lexical and semantic scores, modulates by prominence, pulls in
//! graph-adjacent memories via spreading activation, applies MMR
//! diversity and an optional language-model re-rank, then bumps access
//! counters for everything returned - all against one consistent
//! candidate snapshot.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::graph::{ActivationConfig, RelationGraph};
use crate::memory::Memory;
use crate::providers::{EmbeddingProvider, LanguageProvider};
use crate::retrieval::{
    cosine_similarity, mmr_rerank, rerank_scores, Bm25Scorer, MmrCandidate, RerankConfig,
};
use crate::storage::ContentStore;
use crate::text::token_set;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Weights and knobs for the retrieval pipeline
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Default result count k
    pub limit: usize,
    /// Weight of the cosine score in the blend
    pub semantic_weight: f64,
    /// Weight of the rank-normalized lexical score in the blend
    pub lexical_weight: f64,
    /// Strength of prominence modulation; 0 disables it (lean mode)
    pub prominence_weight: f64,
    /// Keep the top `candidate_multiplier * k` blended candidates
    pub candidate_multiplier: usize,
    /// How many top matches seed spreading activation
    pub activation_seed_count: usize,
    /// Merge weight for normalized activation scores
    pub activation_weight: f64,
    /// Activation traversal parameters (deterministic here)
    pub activation: ActivationConfig,
    /// MMR trade-off between relevance and diversity
    pub mmr_lambda: f64,
    /// MMR only runs at or above this many candidates
    pub mmr_min_results: usize,
    /// Whether the language re-rank stage runs by default
    pub enable_rerank: bool,
    /// Re-rank stage budget
    pub rerank: RerankConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl RetrievalConfig {
    /// The full pipeline: equal lexical/semantic blend.
    pub fn full() -> Self {
        Self {
            limit: 10,
            semantic_weight: 0.5,
            lexical_weight: 0.5,
            prominence_weight: 1.0,
            candidate_multiplier: 4,
            activation_seed_count: 3,
            activation_weight: 1.0,
            activation: ActivationConfig::deterministic(),
            mmr_lambda: 0.5,
            mmr_min_results: 4,
            enable_rerank: false,
            rerank: RerankConfig::default(),
        }
    }

    /// Lexical-leaning blend for keyword-heavy workloads.
    pub fn lexical_lean() -> Self {
        Self {
            semantic_weight: 0.3,
            lexical_weight: 0.7,
            ..Self::full()
        }
    }

    /// Pure vector scoring.
    pub fn vector_only() -> Self {
        Self {
            semantic_weight: 1.0,
            lexical_weight: 0.0,
            ..Self::full()
        }
    }

    /// Lean mode: no prominence modulation.
    pub fn lean() -> Self {
        Self {
            prominence_weight: 0.0,
            ..Self::full()
        }
    }
}

/// Per-call retrieval flags
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    /// Override the configured result count
    pub limit: Option<usize>,
    /// Override the configured re-rank toggle
    pub enable_rerank: Option<bool>,
    /// Drop goal-linked memories from the candidate set
    pub exclude_goal_linked: bool,
}

// ============================================================================
// RESULTS
// ============================================================================

/// How a retrieved memory was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    /// Lexical score only
    Lexical,
    /// Semantic score only
    Semantic,
    /// Both scorers contributed
    Hybrid,
    /// Pulled in by spreading activation
    Graph,
}

/// One ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub score: f64,
    pub match_kind: MatchKind,
}

struct ScoredCandidate {
    id: String,
    score: f64,
    match_kind: MatchKind,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// The hybrid retrieval pipeline
pub struct RetrievalPipeline {
    store: Arc<ContentStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    language: Option<Arc<dyn LanguageProvider>>,
    graph: RelationGraph,
    config: RetrievalConfig,
    /// LRU cache for query embeddings to avoid re-embedding repeats
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl RetrievalPipeline {
    pub fn new(
        store: Arc<ContentStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        language: Option<Arc<dyn LanguageProvider>>,
        config: RetrievalConfig,
    ) -> Self {
        let graph = RelationGraph::new(store.clone());
        Self {
            store,
            embedder,
            language,
            graph,
            config,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(100).expect("100 is non-zero"),
            )),
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed the query, consulting the LRU cache first. Returns None
    /// when no embedder is configured or the call fails - retrieval
    /// degrades to lexical scoring.
    async fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        if !embedder.is_available() {
            return None;
        }
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(cached) = cache.get(query) {
                return Some(cached.clone());
            }
        }
        match embedder.embed(query).await {
            Ok(vector) => {
                if let Ok(mut cache) = self.query_cache.lock() {
                    cache.put(query.to_string(), vector.clone());
                }
                Some(vector)
            }
            Err(error) => {
                tracing::warn!("query embedding failed, lexical-only retrieval: {error}");
                None
            }
        }
    }

    /// Run the full retrieval algorithm.
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<RetrievedMemory>> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidInput("query must not be empty".into()));
        }
        let k = options.limit.unwrap_or(self.config.limit);
        if k == 0 {
            return Ok(Vec::new());
        }

        // 1-2. Candidate snapshot
        let mut candidates = self.store.latest_memories(user_id)?;
        if options.exclude_goal_linked {
            candidates.retain(|memory| !memory.is_goal());
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let by_id: HashMap<&str, &Memory> =
            candidates.iter().map(|m| (m.id.as_str(), m)).collect();

        // 3-4. Semantic scores
        let query_vector = self.query_embedding(query).await;
        let semantic: HashMap<&str, f64> = match &query_vector {
            Some(vector) => candidates
                .iter()
                .filter_map(|memory| {
                    memory.embedding.as_deref().map(|embedding| {
                        (
                            memory.id.as_str(),
                            cosine_similarity(vector, embedding).max(0.0) as f64,
                        )
                    })
                })
                .collect(),
            None => HashMap::new(),
        };

        // 5. Lexical scores, rank-normalized
        let scorer = Bm25Scorer::new(
            candidates
                .iter()
                .map(|memory| (memory.id.as_str(), memory.content.as_str())),
        );
        let lexical = Bm25Scorer::rank_normalized(&scorer.score(query));

        // 6-7. Blend and modulate by prominence
        let mut scored: Vec<ScoredCandidate> = Vec::new();
        for memory in &candidates {
            let sem = semantic.get(memory.id.as_str()).copied().unwrap_or(0.0);
            let lex = lexical.get(memory.id.as_str()).copied().unwrap_or(0.0);
            let base = self.config.semantic_weight * sem + self.config.lexical_weight * lex;
            if base <= 0.0 {
                continue;
            }
            let match_kind = match (sem > 0.0, lex > 0.0) {
                (true, true) => MatchKind::Hybrid,
                (true, false) => MatchKind::Semantic,
                _ => MatchKind::Lexical,
            };
            let modulation = (1.0 - self.config.prominence_weight)
                + self.config.prominence_weight * memory.prominence;
            scored.push(ScoredCandidate {
                id: memory.id.clone(),
                score: base * modulation,
                match_kind,
            });
        }

        // 8. Keep the top 4k
        Self::sort_ranked(&mut scored, &by_id);
        scored.truncate(self.config.candidate_multiplier * k);

        // 9. Spreading activation from the top matches. Seed energies
        // are normalized so the best match starts at 1.0; raw blended
        // scores would die under the activation threshold.
        let max_seed_score = scored
            .iter()
            .take(self.config.activation_seed_count)
            .map(|candidate| candidate.score)
            .fold(0.0, f64::max)
            .max(1e-9);
        let seeds: Vec<(String, f64)> = scored
            .iter()
            .take(self.config.activation_seed_count)
            .map(|candidate| (candidate.id.clone(), candidate.score / max_seed_score))
            .collect();
        if !seeds.is_empty() {
            let activated = self.graph.spread(&seeds, &self.config.activation, None)?;
            let max_activation = activated
                .iter()
                .map(|node| node.activation)
                .fold(0.0, f64::max);
            if max_activation > 0.0 {
                for node in activated {
                    if !by_id.contains_key(node.id.as_str()) {
                        continue;
                    }
                    let merged = self.config.activation_weight * node.activation / max_activation;
                    match scored.iter_mut().find(|c| c.id == node.id) {
                        Some(existing) => existing.score += merged,
                        None => scored.push(ScoredCandidate {
                            id: node.id,
                            score: merged,
                            match_kind: MatchKind::Graph,
                        }),
                    }
                }
                Self::sort_ranked(&mut scored, &by_id);
            }
        }

        // 10. MMR diversity
        if scored.len() >= self.config.mmr_min_results {
            let max_score = scored.iter().map(|c| c.score).fold(0.0, f64::max).max(1e-9);
            let mmr_candidates: Vec<MmrCandidate> = scored
                .iter()
                .map(|candidate| MmrCandidate {
                    id: candidate.id.clone(),
                    relevance: candidate.score / max_score,
                    tokens: token_set(&by_id[candidate.id.as_str()].content),
                })
                .collect();
            let order = mmr_rerank(mmr_candidates, self.config.mmr_lambda, scored.len());
            scored.sort_by_key(|candidate| {
                order
                    .iter()
                    .position(|id| *id == candidate.id)
                    .unwrap_or(usize::MAX)
            });
        }

        // 11. Optional language re-rank over the top 2k
        let rerank_enabled = options.enable_rerank.unwrap_or(self.config.enable_rerank);
        if rerank_enabled {
            if let Some(language) = self.language.as_ref().filter(|l| l.is_available()) {
                let window = (2 * k).min(scored.len());
                let contents: Vec<String> = scored[..window]
                    .iter()
                    .map(|candidate| by_id[candidate.id.as_str()].content.clone())
                    .collect();
                match rerank_scores(language.as_ref(), query, &contents, &self.config.rerank).await
                {
                    Ok(new_scores) => {
                        for (candidate, score) in scored[..window].iter_mut().zip(new_scores) {
                            candidate.score = score;
                        }
                        let mut head: Vec<ScoredCandidate> = scored.drain(..window).collect();
                        Self::sort_ranked(&mut head, &by_id);
                        head.extend(scored.drain(..));
                        scored = head;
                    }
                    Err(error) => {
                        tracing::warn!("rerank failed, keeping pre-rerank order: {error}");
                    }
                }
            }
        }

        // 12. Truncate to k
        scored.truncate(k);

        // 13. Bump access counters in one transaction
        let ids: Vec<String> = scored.iter().map(|candidate| candidate.id.clone()).collect();
        self.store.record_access(&ids, Utc::now().timestamp_millis())?;

        Ok(scored
            .into_iter()
            .map(|candidate| RetrievedMemory {
                memory: by_id[candidate.id.as_str()].clone(),
                score: candidate.score,
                match_kind: candidate.match_kind,
            })
            .collect())
    }

    /// Score-descending order with the documented tie-break: higher
    /// importance, then newer document date, then lexicographic id.
    fn sort_ranked(scored: &mut [ScoredCandidate], by_id: &HashMap<&str, &Memory>) {
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ma = &by_id[a.id.as_str()];
                    let mb = &by_id[b.id.as_str()];
                    mb.importance
                        .cmp(&ma.importance)
                        .then_with(|| mb.document_date.cmp(&ma.document_date))
                        .then_with(|| a.id.cmp(&b.id))
                })
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================
