//! Database Migrations
//!
//! Schema migration definitions for the content store. Applied
//! idempotently on open; each version runs inside `execute_batch`.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, relations, sessions, scheduled items, patterns",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Kanban board column with back-fill from legacy (status, trigger_at)",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Gardener cycle history",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'fact',
    kind TEXT NOT NULL DEFAULT 'regular',
    importance INTEGER NOT NULL DEFAULT 5,
    confidence REAL NOT NULL DEFAULT 1.0,
    is_latest INTEGER NOT NULL DEFAULT 1,

    -- Epoch-ms timestamps of the source document and described event
    document_date INTEGER NOT NULL,
    event_date INTEGER,

    -- Derived salience, recomputed by the decay engine
    prominence REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_ms INTEGER,

    -- Embedding storage (little-endian f32 blob)
    embedding BLOB,
    embedding_dim INTEGER,

    -- Provenance
    source_chunk TEXT,
    metadata TEXT,
    learned_from TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_user_latest ON memories(user_id, is_latest);
CREATE INDEX IF NOT EXISTS idx_memories_prominence ON memories(prominence);
CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);

-- Directed typed relations; duplicates collapse onto one row per
-- (source, target, type), keeping the stronger confidence at write time
CREATE TABLE IF NOT EXISTS relations (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    UNIQUE (source_id, target_id, relation_type),
    FOREIGN KEY (source_id) REFERENCES memories(id) ON DELETE CASCADE,
    FOREIGN KEY (target_id) REFERENCES memories(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id);
CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS session_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_session_messages_session ON session_messages(session_id);

CREATE TABLE IF NOT EXISTS session_summaries (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    summary TEXT NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]',
    message_count INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_session_summaries_user ON session_summaries(user_id);
CREATE INDEX IF NOT EXISTS idx_session_summaries_created ON session_summaries(created_at);

CREATE TABLE IF NOT EXISTS scheduled_items (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    session_id TEXT,
    source TEXT NOT NULL DEFAULT 'user',
    kind TEXT NOT NULL DEFAULT 'nudge',
    item_type TEXT NOT NULL DEFAULT 'reminder',
    message TEXT NOT NULL,
    context TEXT,
    trigger_at INTEGER NOT NULL DEFAULT 0,
    recurring TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    priority TEXT NOT NULL DEFAULT 'medium',
    labels TEXT NOT NULL DEFAULT '[]',
    depends_on TEXT NOT NULL DEFAULT '[]',
    goal_id TEXT,
    task_config TEXT,
    result TEXT,
    fired_at INTEGER,
    completed_at INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_user ON scheduled_items(user_id);
CREATE INDEX IF NOT EXISTS idx_items_status ON scheduled_items(status);
CREATE INDEX IF NOT EXISTS idx_items_trigger ON scheduled_items(trigger_at);

CREATE TABLE IF NOT EXISTS behavioral_patterns (
    user_id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Board column
///
/// Pre-existing rows predate the kanban board, so their column is
/// inferred once from legacy (status, trigger_at, source).
const MIGRATION_V2_UP: &str = r#"
ALTER TABLE scheduled_items ADD COLUMN board_status TEXT;

UPDATE scheduled_items SET board_status = CASE
    WHEN status IN ('fired', 'acted') THEN 'done'
    WHEN status IN ('dismissed', 'expired') THEN 'archived'
    WHEN status = 'processing' THEN 'in_progress'
    WHEN trigger_at > 0 THEN 'scheduled'
    WHEN source = 'agent' THEN 'inbox'
    ELSE 'backlog'
END
WHERE board_status IS NULL;

CREATE INDEX IF NOT EXISTS idx_items_board ON scheduled_items(board_status);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Gardener cycle history
///
/// One row per tick so operators (and the deep tick's decay-if-stale
/// check) can see when each tier last ran and what it accomplished.
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS gardener_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tier TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    memories_decayed INTEGER NOT NULL DEFAULT 0,
    memories_archived INTEGER NOT NULL DEFAULT 0,
    items_consolidated INTEGER NOT NULL DEFAULT 0,
    clusters_fused INTEGER NOT NULL DEFAULT 0,
    relations_minted INTEGER NOT NULL DEFAULT 0,
    gaps_scheduled INTEGER NOT NULL DEFAULT 0,
    insights_written INTEGER NOT NULL DEFAULT 0,
    items_fired INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_gardener_runs_tier ON gardener_runs(tier, completed_at);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
