//! Fusion Engine (NREM consolidation)
//!
//! Finds clusters of related dormant memories and consolidates each
//! into a single derived memory: DERIVES edges to every source, sources
//! flipped to superseded, all in one transaction. Any per-cluster
//! failure increments a counter and the pass continues.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{timeout, Duration};

use crate::error::Result;
use crate::memory::{LearnedFrom, Memory, MemoryCategory, MemoryDraft, MemoryKind, Relation};
use crate::providers::{extract_json, CompletionRequest, LanguageProvider, ProviderError};
use crate::storage::ContentStore;
use crate::text::truncate_chars;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Which pass is running; the deep-sleep pass uses a wider prominence
/// window and allows cross-category clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    /// Daytime fusion: narrow window, same-category clusters only
    Daytime,
    /// NREM deep-sleep pass: wide window, cross-category allowed
    Sleep,
}

/// Configuration for the fusion engine
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Daytime prominence window [lo, hi)
    pub window_lo: f64,
    pub window_hi: f64,
    /// Deep-sleep prominence window [lo, hi)
    pub sleep_window_lo: f64,
    pub sleep_window_hi: f64,
    /// Minimum connected-component size worth consolidating
    pub min_cluster_size: usize,
    /// Cap on clusters processed per cycle
    pub max_clusters: usize,
    /// Relation-context edges listed per cluster member
    pub max_edges_per_member: usize,
    /// Endpoint texts in the relation context are truncated to this
    pub endpoint_truncate_chars: usize,
    /// Prominence ceiling for the derived memory
    pub prominence_cap: f64,
    /// Per-cluster language budget
    pub timeout_ms: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            window_lo: 0.05,
            window_hi: 0.8,
            sleep_window_lo: 0.02,
            sleep_window_hi: 0.9,
            min_cluster_size: 3,
            max_clusters: 5,
            max_edges_per_member: 3,
            endpoint_truncate_chars: 80,
            prominence_cap: 0.7,
            timeout_ms: 30_000,
        }
    }
}

/// Outcome counters for one fusion pass
#[derive(Debug, Clone, Default)]
pub struct FusionReport {
    pub clusters_considered: usize,
    pub clusters_fused: usize,
    pub failures: usize,
}

// ============================================================================
// CLUSTER DISCOVERY
// ============================================================================

/// Union-find over indices
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Connected components of the relation subgraph over `members`.
fn connected_components(members: &[Memory], relations: &[Relation]) -> Vec<Vec<usize>> {
    let index_of: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(index, memory)| (memory.id.as_str(), index))
        .collect();
    let mut set = DisjointSet::new(members.len());
    for relation in relations {
        if let (Some(&a), Some(&b)) = (
            index_of.get(relation.source_id.as_str()),
            index_of.get(relation.target_id.as_str()),
        ) {
            set.union(a, b);
        }
    }
    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for index in 0..members.len() {
        let root = set.find(index);
        components.entry(root).or_default().push(index);
    }
    let mut result: Vec<Vec<usize>> = components.into_values().collect();
    result.sort_by(|a, b| b.len().cmp(&a.len()));
    result
}

// ============================================================================
// FUSION ENGINE
// ============================================================================

/// The fusion engine
pub struct FusionEngine {
    store: Arc<ContentStore>,
    language: Arc<dyn LanguageProvider>,
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(
        store: Arc<ContentStore>,
        language: Arc<dyn LanguageProvider>,
        config: FusionConfig,
    ) -> Self {
        Self {
            store,
            language,
            config,
        }
    }

    /// Run one fusion pass for a user.
    pub async fn run(&self, user_id: &str, mode: FusionMode) -> Result<FusionReport> {
        let mut report = FusionReport::default();
        if !self.language.is_available() {
            tracing::debug!("fusion skipped: language capability unavailable");
            return Ok(report);
        }

        let (lo, hi) = match mode {
            FusionMode::Daytime => (self.config.window_lo, self.config.window_hi),
            FusionMode::Sleep => (self.config.sleep_window_lo, self.config.sleep_window_hi),
        };
        let members = self.store.memories_in_window(user_id, lo, hi)?;
        if members.len() < self.config.min_cluster_size {
            return Ok(report);
        }
        let ids: Vec<String> = members.iter().map(|memory| memory.id.clone()).collect();
        let relations = self.store.relations_among(&ids)?;

        let clusters: Vec<Vec<&Memory>> = connected_components(&members, &relations)
            .into_iter()
            .filter(|component| component.len() >= self.config.min_cluster_size)
            .map(|component| {
                component
                    .into_iter()
                    .map(|index| &members[index])
                    .collect::<Vec<_>>()
            })
            .filter(|cluster| {
                mode == FusionMode::Sleep || Self::single_category(cluster).is_some()
            })
            .take(self.config.max_clusters)
            .collect();

        for cluster in clusters {
            report.clusters_considered += 1;
            match self.fuse_cluster(&cluster, &relations, mode).await {
                Ok(()) => report.clusters_fused += 1,
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!("fusion cluster failed: {error}");
                }
            }
        }
        Ok(report)
    }

    fn single_category(cluster: &[&Memory]) -> Option<MemoryCategory> {
        let first = cluster.first()?.category;
        cluster
            .iter()
            .all(|memory| memory.category == first)
            .then_some(first)
    }

    /// Relation context: up to N edges per member, naming truncated
    /// endpoint texts.
    fn relation_context(&self, cluster: &[&Memory], relations: &[Relation]) -> String {
        let content_of: HashMap<&str, &str> = cluster
            .iter()
            .map(|memory| (memory.id.as_str(), memory.content.as_str()))
            .collect();
        let mut lines = Vec::new();
        for member in cluster {
            let mut listed = 0;
            for relation in relations {
                if listed >= self.config.max_edges_per_member {
                    break;
                }
                if relation.source_id != member.id {
                    continue;
                }
                if let (Some(source), Some(target)) = (
                    content_of.get(relation.source_id.as_str()),
                    content_of.get(relation.target_id.as_str()),
                ) {
                    lines.push(format!(
                        "- \"{}\" {} \"{}\"",
                        truncate_chars(source, self.config.endpoint_truncate_chars),
                        relation.relation_type,
                        truncate_chars(target, self.config.endpoint_truncate_chars),
                    ));
                    listed += 1;
                }
            }
        }
        lines.join("\n")
    }

    async fn fuse_cluster(
        &self,
        cluster: &[&Memory],
        relations: &[Relation],
        mode: FusionMode,
    ) -> Result<()> {
        let contents: Vec<&str> = cluster.iter().map(|memory| memory.content.as_str()).collect();
        let total_length: usize = contents.iter().map(|content| content.len()).sum();

        let system = "You consolidate related memories about a user into one concise summary. \
            Reply with a JSON object: {\"summary\": \"...\", \"importance\": 1-10, \
            \"category\": \"preference|fact|event|relationship|insight\"}. \
            The summary must be strictly shorter than the combined source texts.";
        let mut user = String::from("Memories to consolidate:\n");
        for content in &contents {
            user.push_str(&format!("- {content}\n"));
        }
        let context = self.relation_context(cluster, relations);
        if !context.is_empty() {
            user.push_str("\nKnown relations:\n");
            user.push_str(&context);
        }
        let request = CompletionRequest::single_turn(system, user).with_max_tokens(512);

        let completion = timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.language.complete(request),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.timeout_ms))??;

        let parsed = extract_json(&completion.text())
            .ok_or_else(|| ProviderError::Model("unparseable fusion response".to_string()))?;
        let summary = parsed
            .get("summary")
            .and_then(|value| value.as_str())
            .ok_or_else(|| ProviderError::Model("fusion response missing summary".to_string()))?
            .to_string();
        if summary.trim().is_empty() || summary.len() >= total_length {
            return Err(ProviderError::Model(
                "fusion summary not shorter than its sources".to_string(),
            )
            .into());
        }

        let cross_category = Self::single_category(cluster).is_none();
        let category = if cross_category {
            MemoryCategory::Insight
        } else {
            parsed
                .get("category")
                .and_then(|value| value.as_str())
                .map(MemoryCategory::parse_name)
                .unwrap_or_else(|| cluster[0].category)
        };
        let importance = cluster.iter().map(|memory| memory.importance).max().unwrap_or(5);
        let confidence = cluster
            .iter()
            .map(|memory| memory.confidence)
            .fold(f64::INFINITY, f64::min)
            .min(1.0);

        let mut draft = MemoryDraft::new(&cluster[0].user_id, summary);
        draft.category = category;
        draft.kind = MemoryKind::Derived;
        draft.importance = importance;
        draft.confidence = confidence;
        draft.learned_from = Some(match mode {
            FusionMode::Daytime => LearnedFrom::DaytimeFusion,
            FusionMode::Sleep => LearnedFrom::NremConsolidation,
        });

        let source_ids: Vec<String> = cluster.iter().map(|memory| memory.id.clone()).collect();
        self.store
            .create_derived(draft, &source_ids, self.config.prominence_cap)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
