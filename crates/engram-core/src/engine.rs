//! Memory Engine - the application context
//!
//! Wires the content store, providers, retrieval pipeline, board, and
//! gardener together. Created once at boot and passed down by
//! reference; there are no ambient globals. Channels call the typed
//! entry points here; the gardener and scheduler run on their own
//! tasks.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{TimeZone, Timelike, Utc};

use crate::board::Board;
use crate::board::{EngagementTracker, Scheduler};
use crate::context::{format_context, ContextConfig};
use crate::error::Result;
use crate::gardener::{Gardener, GardenerConfig};
use crate::graph::{DetectionConfig, RelationGraph};
use crate::memory::{Memory, MemoryDraft, MessageRole, Relation, Session, SessionMessage};
use crate::providers::{ChannelAdapter, EmbeddingProvider, LanguageProvider, SkillRunner};
use crate::retrieval::{RetrievalConfig, RetrievalOptions, RetrievalPipeline, RetrievedMemory};
use crate::storage::ContentStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// What one observed user message changed
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservationOutcome {
    /// Fired items flipped to acted by this message
    pub items_acted: usize,
}

/// Top-level engine configuration, aggregating per-component configs
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Database location; None uses the platform data directory
    pub db_path: Option<PathBuf>,
    /// Retrieval pipeline weights and knobs
    pub retrieval: RetrievalConfig,
    /// Ingest-time relation detection parameters
    pub detection: DetectionConfig,
    /// Whether ingest runs relation detection by default
    pub detect_relations: bool,
    /// Context formatting
    pub context: ContextConfig,
    /// Background cycles
    pub gardener: GardenerConfig,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The memory engine
pub struct MemoryEngine {
    store: Arc<ContentStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    language: Option<Arc<dyn LanguageProvider>>,
    pipeline: RetrievalPipeline,
    graph: RelationGraph,
    board: Board,
    gardener: Arc<Gardener>,
    engagement: EngagementTracker,
    config: EngineConfig,
}

impl MemoryEngine {
    /// Boot the engine: open the store, apply migrations, wire up the
    /// pipeline and background cycles.
    pub fn new(
        config: EngineConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        language: Option<Arc<dyn LanguageProvider>>,
        channel: Option<Arc<dyn ChannelAdapter>>,
        runner: Option<Arc<dyn SkillRunner>>,
    ) -> Result<Self> {
        let store = Arc::new(ContentStore::new(config.db_path.clone())?);
        let pipeline = RetrievalPipeline::new(
            store.clone(),
            embedder.clone(),
            language.clone(),
            config.retrieval.clone(),
        );
        let graph = RelationGraph::new(store.clone());
        let board = Board::new(store.clone());
        let gardener = Arc::new(Gardener::new(
            store.clone(),
            language.clone(),
            channel,
            runner,
            config.gardener.clone(),
        ));
        let engagement =
            EngagementTracker::new(store.clone(), config.gardener.engagement.clone());
        Ok(Self {
            store,
            embedder,
            language,
            pipeline,
            graph,
            board,
            gardener,
            engagement,
            config,
        })
    }

    pub fn store(&self) -> Arc<ContentStore> {
        self.store.clone()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn gardener(&self) -> Arc<Gardener> {
        self.gardener.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Ingest a memory. The entity write completes before any relation
    /// detection; detection (when enabled and both providers are
    /// available) uses the persisted id, so its edges stay correct even
    /// if further ingests land first.
    pub async fn ingest(
        &self,
        mut draft: MemoryDraft,
        detect_relations: Option<bool>,
    ) -> Result<(Memory, Vec<Relation>)> {
        if draft.embedding.is_none() {
            if let Some(embedder) = self.embedder.as_ref().filter(|e| e.is_available()) {
                match embedder.embed(&draft.content).await {
                    Ok(vector) => draft.embedding = Some(vector),
                    Err(error) => {
                        tracing::warn!("ingest embedding failed, storing without: {error}");
                    }
                }
            }
        }

        let memory = self.store.add_memory(draft)?;

        let detect = detect_relations.unwrap_or(self.config.detect_relations);
        let relations = match (detect, self.embedder.as_ref(), self.language.as_ref()) {
            (true, Some(embedder), Some(language)) => self
                .graph
                .detect_relations(
                    &memory,
                    embedder.as_ref(),
                    language.as_ref(),
                    &self.config.detection,
                )
                .await
                .unwrap_or_else(|error| {
                    tracing::warn!("relation detection failed for {}: {error}", memory.id);
                    Vec::new()
                }),
            _ => Vec::new(),
        };
        Ok((memory, relations))
    }

    // ========================================================================
    // RETRIEVAL
    // ========================================================================

    /// Retrieve ranked memories for a query.
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<RetrievedMemory>> {
        self.pipeline.retrieve(query, user_id, options).await
    }

    /// Retrieve and shape into a prompt-ready context block.
    pub async fn retrieve_context(&self, query: &str, user_id: &str) -> Result<String> {
        let results = self
            .pipeline
            .retrieve(query, user_id, &RetrievalOptions::default())
            .await?;
        let patterns = self.store.get_patterns(user_id)?;
        Ok(format_context(&results, patterns.as_ref(), &self.config.context))
    }

    // ========================================================================
    // SESSIONS AND OBSERVATION
    // ========================================================================

    /// Open a session for a user.
    pub fn open_session(&self, user_id: &str) -> Result<Session> {
        Ok(self.store.create_session(user_id)?)
    }

    /// Record one user message: appends to the session, folds the text
    /// into behavioral patterns (best-effort), and flips recently fired
    /// proactive items to acted.
    pub fn observe_user_message(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        text: &str,
        now_ms: i64,
    ) -> Result<ObservationOutcome> {
        if let Some(session_id) = session_id {
            self.store.append_session_message(&SessionMessage {
                session_id: session_id.to_string(),
                role: MessageRole::User,
                content: text.to_string(),
                timestamp_ms: now_ms,
            })?;
        }

        let mut patterns = self
            .store
            .get_patterns(user_id)?
            .unwrap_or_else(|| crate::memory::BehavioralPatterns::new(user_id));
        let local_hour = local_hour(now_ms, patterns.timezone.as_deref());
        patterns.observe_message(text, local_hour, now_ms);
        if let Err(error) = self.store.put_patterns(&patterns) {
            tracing::warn!("behavioral-pattern write failed for {user_id}: {error}");
        }

        let items_acted = self.engagement.note_user_activity(user_id, now_ms)?;
        Ok(ObservationOutcome { items_acted })
    }

    /// Spawn the gardener cycles and the scheduler sweep.
    pub fn spawn_background(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = self.gardener.clone().spawn();
        let scheduler: Arc<Scheduler> = self.gardener.scheduler();
        handles.push(scheduler.spawn());
        handles
    }
}

fn local_hour(now_ms: i64, timezone: Option<&str>) -> u32 {
    let tz = timezone
        .and_then(|name| chrono_tz::Tz::from_str(name).ok())
        .unwrap_or(chrono_tz::UTC);
    Utc.timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Utc::now)
        .with_timezone(&tz)
        .hour()
}

// ============================================================================
// TESTS
// ============================================================================
