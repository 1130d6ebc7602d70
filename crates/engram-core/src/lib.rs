//! # Engram Core
//!
//! Cognitive memory engine for long-lived conversational agents:
//!
//! - **Content Store**: transactional SQLite (WAL) persistence of
//!   memories, relations, sessions, scheduled items, and behavioral
//!   patterns
//! - **Hybrid Retrieval**: BM25 + cosine blending, prominence
//!   modulation, spreading activation, MMR diversity, optional
//!   language-model re-rank
//! - **Decay Engine**: four-factor prominence with per-kind and
//!   per-category half-lives; archival is a flag transition, never a
//!   delete
//! - **Gardener**: tiered light / deep / sleep cycles - decay, NREM
//!   fusion, REM exploration, reflection (SOUL.md), gap diagnosis, and
//!   proactive scheduling over a kanban board
//!
//! Model hosting stays outside the crate: embedding and language
//! providers, delivery channels, and the skill runner are capability
//! traits implemented by the host application.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{EngineConfig, MemoryEngine, MemoryDraft, RetrievalOptions};
//!
//! let engine = MemoryEngine::new(EngineConfig::default(), None, None, None, None)?;
//!
//! // Ingest a memory
//! let (memory, _relations) = engine
//!     .ingest(MemoryDraft::new("telegram:123", "User loves Italian food"), None)
//!     .await?;
//!
//! // Retrieve
//! let results = engine
//!     .retrieve("What food does the user like?", "telegram:123", &RetrievalOptions::default())
//!     .await?;
//!
//! // Background maintenance
//! let handles = engine.spawn_background();
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod board;
pub mod context;
pub mod decay;
pub mod engine;
pub mod error;
pub mod exploration;
pub mod fusion;
pub mod gaps;
pub mod gardener;
pub mod graph;
pub mod memory;
pub mod providers;
pub mod reflection;
pub mod retrieval;
pub mod storage;
pub mod text;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Engine facade
pub use engine::{EngineConfig, MemoryEngine, ObservationOutcome};

// Errors
pub use error::{EngineError, Result};

// Domain types
pub use memory::{
    split_channel_prefix, AffectEma, AffectState, BehavioralPatterns, BoardColumn, ItemKind,
    ItemSource, ItemStatus, LearnedFrom, Memory, MemoryCategory, MemoryDraft, MemoryKind,
    MemoryStats, MessageRole, Priority, ProactivenessDial, Relation, RelationType,
    ResponsePreferences, ScheduledItem, ScheduledItemDraft, Session, SessionMessage,
    SessionSummary, UserChannel,
};

// Storage layer
pub use storage::{ContentStore, GardenerRunRecord, StorageError};

// Capability traits
pub use providers::{
    ChannelAdapter, ChatMessage, ChatRole, Completion, CompletionRequest, ContentBlock,
    EmbeddingProvider, LanguageProvider, ProviderError, SkillOutcome, SkillRunner, StopReason,
    Usage,
};

// Decay engine
pub use decay::{
    band, initial_prominence, DecayConfig, DecayEngine, ProminenceBand, ProminenceUpdate,
};

// Retrieval
pub use retrieval::{
    cosine_similarity, Bm25Scorer, MatchKind, RerankConfig, RetrievalConfig, RetrievalOptions,
    RetrievalPipeline, RetrievedMemory,
};

// Relation graph
pub use graph::{
    ActivatedMemory, ActivationConfig, DetectionConfig, RelationGraph,
};

// Background cycles
pub use exploration::{ExplorationConfig, ExplorationEngine, ExplorationReport};
pub use fusion::{FusionConfig, FusionEngine, FusionMode, FusionReport};
pub use gaps::{
    GapConfig, GapKind, GapPipeline, GapReport, GapSignal, Severity, SignalConfig,
    TriageDiagnosis, Urgency,
};
pub use gardener::{Gardener, GardenerConfig};
pub use reflection::{ReflectionConfig, ReflectionEngine, ReflectionReport};

// Board and scheduler
pub use board::{
    is_quiet_hours, plan_delivery_time, Board, EngagementConfig, EngagementTracker, Scheduler,
    SchedulerConfig, SweepReport,
};

// Context formatting
pub use context::{format_context, ContextConfig};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Board, ContentStore, EngineConfig, EngineError, Gardener, MatchKind, Memory,
        MemoryCategory, MemoryDraft, MemoryEngine, MemoryKind, Result, RetrievalOptions,
        RetrievalPipeline, RetrievedMemory, ScheduledItem, ScheduledItemDraft, Scheduler,
        StorageError,
    };

    pub use crate::{
        ChannelAdapter, EmbeddingProvider, LanguageProvider, ProviderError, SkillRunner,
    };
}
