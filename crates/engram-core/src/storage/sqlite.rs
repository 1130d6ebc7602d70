//! SQLite Content Store
//!
//! Single-writer transactional persistence for memories, relations,
//! sessions, scheduled items, and behavioral patterns.
//!
//! Uses separate reader/writer connections for interior mutability.
//! All methods take `&self` (not `&mut self`), making the store
//! `Send + Sync` so callers can share `Arc<ContentStore>` instead of
//! `Arc<Mutex<ContentStore>>`.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::decay::initial_prominence;
use crate::memory::{
    BehavioralPatterns, BoardColumn, ItemStatus, LearnedFrom, Memory, MemoryCategory, MemoryDraft,
    MemoryKind, MemoryStats, MessageRole, Relation, RelationType, ScheduledItem,
    ScheduledItemDraft, Session, SessionMessage, SessionSummary,
};
use crate::text::word_overlap;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Invariant violation surfaced to the caller
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Malformed arguments at the store boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Opaque payload failed to (de)serialize
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// GARDENER RUN RECORD
// ============================================================================

/// One row of gardener cycle history
#[derive(Debug, Clone, Default)]
pub struct GardenerRunRecord {
    pub tier: String,
    pub duration_ms: i64,
    pub memories_decayed: i64,
    pub memories_archived: i64,
    pub items_consolidated: i64,
    pub clusters_fused: i64,
    pub relations_minted: i64,
    pub gaps_scheduled: i64,
    pub insights_written: i64,
    pub items_fired: i64,
    pub failures: i64,
}

// ============================================================================
// EMBEDDING BLOB CODEC
// ============================================================================

fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

// ============================================================================
// CONTENT STORE
// ============================================================================

const MEMORY_COLUMNS: &str = "id, user_id, content, category, kind, importance, confidence, \
     is_latest, document_date, event_date, prominence, access_count, last_accessed_ms, \
     embedding, source_chunk, metadata, learned_from, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, user_id, session_id, source, kind, item_type, message, context, \
     trigger_at, recurring, status, board_status, priority, labels, depends_on, goal_id, \
     task_config, result, fired_at, completed_at, created_at, updated_at";

/// The content store: typed, transactional persistence behind a
/// single-writer / concurrent-reader connection pair.
pub struct ContentStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl ContentStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `db_path`, applying pending
    /// migrations. `None` uses the platform data directory.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "engram", "core").ok_or_else(|| {
                    StorageError::Init("Could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("engram.db")
            }
        };

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".to_string()))
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
        let category: String = row.get(3)?;
        let kind: String = row.get(4)?;
        let importance: i64 = row.get(5)?;
        let embedding: Option<Vec<u8>> = row.get(13)?;
        let metadata: Option<String> = row.get(15)?;
        let learned_from: Option<String> = row.get(16)?;
        Ok(Memory {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            category: MemoryCategory::parse_name(&category),
            kind: MemoryKind::parse_name(&kind),
            importance: importance.clamp(1, 10) as u8,
            confidence: row.get(6)?,
            is_latest: row.get::<_, i64>(7)? != 0,
            document_date: row.get(8)?,
            event_date: row.get(9)?,
            prominence: row.get(10)?,
            access_count: row.get(11)?,
            last_accessed_ms: row.get(12)?,
            embedding: embedding.as_deref().and_then(bytes_to_embedding),
            source_chunk: row.get(14)?,
            metadata: metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok())
                .unwrap_or(serde_json::Value::Null),
            learned_from: learned_from.as_deref().and_then(LearnedFrom::parse_name),
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }

    fn insert_memory_tx(tx: &Connection, draft: &MemoryDraft, now: DateTime<Utc>) -> Result<String> {
        draft.validate().map_err(StorageError::InvalidInput)?;
        let id = Uuid::new_v4().to_string();
        let document_date = draft.document_date.unwrap_or(now.timestamp_millis());
        let prominence = initial_prominence(draft.kind, draft.importance);
        let embedding_bytes = draft.embedding.as_deref().map(embedding_to_bytes);
        let embedding_dim = draft.embedding.as_ref().map(|v| v.len() as i64);
        let metadata = if draft.metadata.is_null() {
            None
        } else {
            Some(serde_json::to_string(&draft.metadata)?)
        };
        tx.execute(
            "INSERT INTO memories (
                id, user_id, content, category, kind, importance, confidence, is_latest,
                document_date, event_date, prominence, access_count, last_accessed_ms,
                embedding, embedding_dim, source_chunk, metadata, learned_from,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, 0, NULL, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                id,
                draft.user_id,
                draft.content,
                draft.category.as_str(),
                draft.kind.as_str(),
                draft.importance as i64,
                draft.confidence,
                document_date,
                draft.event_date,
                prominence,
                embedding_bytes,
                embedding_dim,
                draft.source_chunk,
                metadata,
                draft.learned_from.map(|l| l.as_str()),
                now,
                now,
            ],
        )?;
        Ok(id)
    }

    /// Create a new memory.
    pub fn add_memory(&self, draft: MemoryDraft) -> Result<Memory> {
        let now = Utc::now();
        let id = {
            let writer = self.writer()?;
            Self::insert_memory_tx(&writer, &draft, now)?
        };
        self.get_memory(&id)?
            .ok_or_else(|| StorageError::NotFound(id))
    }

    /// Fetch one memory by id.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let reader = self.reader()?;
        let memory = reader
            .query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                params![id],
                Self::row_to_memory,
            )
            .optional()?;
        Ok(memory)
    }

    /// Persist mutable fields of a memory.
    pub fn update_memory(&self, memory: &Memory) -> Result<()> {
        let metadata = if memory.metadata.is_null() {
            None
        } else {
            Some(serde_json::to_string(&memory.metadata)?)
        };
        let embedding_bytes = memory.embedding.as_deref().map(embedding_to_bytes);
        let embedding_dim = memory.embedding.as_ref().map(|v| v.len() as i64);
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE memories SET content = ?2, category = ?3, kind = ?4, importance = ?5,
                confidence = ?6, is_latest = ?7, event_date = ?8, prominence = ?9,
                embedding = ?10, embedding_dim = ?11, metadata = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                memory.id,
                memory.content,
                memory.category.as_str(),
                memory.kind.as_str(),
                memory.importance as i64,
                memory.confidence,
                memory.is_latest as i64,
                memory.event_date,
                memory.prominence.clamp(0.0, 1.0),
                embedding_bytes,
                embedding_dim,
                metadata,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(memory.id.clone()));
        }
        Ok(())
    }

    /// Replace just the metadata bag of a memory.
    pub fn update_memory_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE memories SET metadata = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, serde_json::to_string(metadata)?, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Supersede `old_id` with a fresh memory, linking them with an
    /// UPDATES edge. The predecessor's flags flip in the same transaction.
    pub fn replace_memory(&self, old_id: &str, draft: MemoryDraft) -> Result<Memory> {
        let now = Utc::now();
        let new_id = {
            let mut writer = self.writer()?;
            let tx = writer.transaction()?;
            let flipped = tx.execute(
                "UPDATE memories SET kind = 'superseded', is_latest = 0, updated_at = ?2
                 WHERE id = ?1",
                params![old_id, now],
            )?;
            if flipped == 0 {
                return Err(StorageError::NotFound(old_id.to_string()));
            }
            let new_id = Self::insert_memory_tx(&tx, &draft, now)?;
            Self::insert_relation_tx(&tx, &new_id, old_id, RelationType::Updates, 1.0, now)?;
            tx.commit()?;
            new_id
        };
        self.get_memory(&new_id)?
            .ok_or_else(|| StorageError::NotFound(new_id))
    }

    /// Create a derived memory from `source_ids`: inserts the new row,
    /// adds a DERIVES edge to every source, and flips each source to
    /// superseded / not-latest - all in one transaction.
    ///
    /// The derived memory's prominence is capped at `prominence_cap`.
    pub fn create_derived(
        &self,
        draft: MemoryDraft,
        source_ids: &[String],
        prominence_cap: f64,
    ) -> Result<Memory> {
        if source_ids.is_empty() {
            return Err(StorageError::InvalidInput(
                "derived memory requires at least one source".to_string(),
            ));
        }
        let now = Utc::now();
        let new_id = {
            let mut writer = self.writer()?;
            let tx = writer.transaction()?;
            let new_id = Self::insert_memory_tx(&tx, &draft, now)?;
            tx.execute(
                "UPDATE memories SET prominence = MIN(prominence, ?2) WHERE id = ?1",
                params![new_id, prominence_cap],
            )?;
            for source_id in source_ids {
                let flipped = tx.execute(
                    "UPDATE memories SET kind = 'superseded', is_latest = 0, updated_at = ?2
                     WHERE id = ?1",
                    params![source_id, now],
                )?;
                if flipped == 0 {
                    return Err(StorageError::NotFound(source_id.clone()));
                }
                Self::insert_relation_tx(&tx, &new_id, source_id, RelationType::Derives, 1.0, now)?;
            }
            tx.commit()?;
            new_id
        };
        self.get_memory(&new_id)?
            .ok_or_else(|| StorageError::NotFound(new_id))
    }

    /// Archive memories by flag transition (never a delete).
    pub fn archive_memories(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let mut archived = 0;
        for id in ids {
            archived += tx.execute(
                "UPDATE memories SET kind = 'superseded', is_latest = 0, updated_at = ?2
                 WHERE id = ?1 AND kind != 'static_profile'",
                params![id, now],
            )?;
        }
        tx.commit()?;
        Ok(archived)
    }

    /// Apply a batch of prominence updates in a single transaction.
    pub fn set_prominences(&self, updates: &[(String, f64)]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let mut applied = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE memories SET prominence = ?2, updated_at = ?3 WHERE id = ?1",
            )?;
            for (id, prominence) in updates {
                applied += stmt.execute(params![id, prominence.clamp(0.0, 1.0), now])?;
            }
        }
        tx.commit()?;
        Ok(applied)
    }

    /// Bump access counters for retrieved memories. Monotone: the
    /// counter only grows and `last_accessed_ms` never moves backwards.
    pub fn record_access(&self, ids: &[String], now_ms: i64) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE memories SET access_count = access_count + 1,
                    last_accessed_ms = MAX(COALESCE(last_accessed_ms, 0), ?2)
                 WHERE id = ?1",
            )?;
            for id in ids {
                stmt.execute(params![id, now_ms])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Latest non-archived memories for a user (the retrieval candidate
    /// set). Read in one statement so the caller sees a consistent
    /// snapshot.
    pub fn latest_memories(&self, user_id: &str) -> Result<Vec<Memory>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories
             WHERE user_id = ?1 AND is_latest = 1 AND kind != 'superseded'
             ORDER BY document_date DESC"
        ))?;
        let memories = stmt
            .query_map(params![user_id], Self::row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(memories)
    }

    /// All decaying memories across users (latest, non-static).
    pub fn memories_for_decay(&self) -> Result<Vec<Memory>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories
             WHERE is_latest = 1 AND kind NOT IN ('static_profile', 'superseded')"
        ))?;
        let memories = stmt
            .query_map([], Self::row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(memories)
    }

    /// Latest memories for a user with prominence in `[lo, hi)`.
    pub fn memories_in_window(&self, user_id: &str, lo: f64, hi: f64) -> Result<Vec<Memory>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories
             WHERE user_id = ?1 AND is_latest = 1 AND kind != 'superseded'
               AND prominence >= ?2 AND prominence < ?3"
        ))?;
        let memories = stmt
            .query_map(params![user_id, lo, hi], Self::row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(memories)
    }

    /// Distinct user ids with at least one memory.
    pub fn list_users(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT DISTINCT user_id FROM memories")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ========================================================================
    // RELATIONS
    // ========================================================================

    fn row_to_relation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relation> {
        let relation_type: String = row.get(3)?;
        Ok(Relation {
            id: row.get(0)?,
            source_id: row.get(1)?,
            target_id: row.get(2)?,
            relation_type: RelationType::parse_name(&relation_type)
                .unwrap_or(RelationType::Extends),
            confidence: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn insert_relation_tx(
        tx: &Connection,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if source_id == target_id {
            return Err(StorageError::Conflict(format!(
                "self-loop relation on {source_id}"
            )));
        }
        tx.execute(
            "INSERT INTO relations (id, source_id, target_id, relation_type, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (source_id, target_id, relation_type)
             DO UPDATE SET confidence = MAX(confidence, excluded.confidence)",
            params![
                Uuid::new_v4().to_string(),
                source_id,
                target_id,
                relation_type.as_str(),
                confidence.clamp(0.0, 1.0),
                now,
            ],
        )?;
        Ok(())
    }

    /// Create a relation edge. Self-loops are rejected; duplicates keep
    /// the stronger confidence.
    pub fn add_relation(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        confidence: f64,
    ) -> Result<Relation> {
        {
            let writer = self.writer()?;
            Self::insert_relation_tx(&writer, source_id, target_id, relation_type, confidence, Utc::now())?;
        }
        let reader = self.reader()?;
        let relation = reader.query_row(
            "SELECT id, source_id, target_id, relation_type, confidence, created_at
             FROM relations WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3",
            params![source_id, target_id, relation_type.as_str()],
            Self::row_to_relation,
        )?;
        Ok(relation)
    }

    /// All edges touching `id`, in either direction.
    pub fn relations_for(&self, id: &str) -> Result<Vec<Relation>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, source_id, target_id, relation_type, confidence, created_at
             FROM relations WHERE source_id = ?1 OR target_id = ?1",
        )?;
        let relations = stmt
            .query_map(params![id], Self::row_to_relation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relations)
    }

    /// All edges whose both endpoints are in `ids`.
    pub fn relations_among(&self, ids: &[String]) -> Result<Vec<Relation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT id, source_id, target_id, relation_type, confidence, created_at
             FROM relations
             WHERE source_id IN ({placeholders}) AND target_id IN ({placeholders})"
        );
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = ids
            .iter()
            .chain(ids.iter())
            .map(|id| id as &dyn rusqlite::ToSql)
            .collect();
        let relations = stmt
            .query_map(bound.as_slice(), Self::row_to_relation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relations)
    }

    /// Whether any edge connects `a` and `b`, in either direction.
    pub fn has_relation(&self, a: &str, b: &str) -> Result<bool> {
        let reader = self.reader()?;
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM relations
             WHERE (source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1)",
            params![a, b],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Open a new session for a user.
    pub fn create_session(&self, user_id: &str) -> Result<Session> {
        if user_id.is_empty() {
            return Err(StorageError::InvalidInput(
                "user_id must not be empty".to_string(),
            ));
        }
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            summary: None,
        };
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO sessions (id, user_id, created_at, summary) VALUES (?1, ?2, ?3, NULL)",
            params![session.id, session.user_id, session.created_at],
        )?;
        Ok(session)
    }

    /// Fetch one session by id.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let reader = self.reader()?;
        let session = reader
            .query_row(
                "SELECT id, user_id, created_at, summary FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        summary: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Append one message to a session.
    pub fn append_session_message(&self, message: &SessionMessage) -> Result<()> {
        let writer = self.writer()?;
        let inserted = writer.execute(
            "INSERT INTO session_messages (session_id, role, content, timestamp_ms)
             SELECT ?1, ?2, ?3, ?4 WHERE EXISTS (SELECT 1 FROM sessions WHERE id = ?1)",
            params![
                message.session_id,
                message.role.as_str(),
                message.content,
                message.timestamp_ms,
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::NotFound(message.session_id.clone()));
        }
        Ok(())
    }

    /// All messages of a session in arrival order.
    pub fn session_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT session_id, role, content, timestamp_ms FROM session_messages
             WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![session_id], |row| {
                let role: String = row.get(1)?;
                Ok(SessionMessage {
                    session_id: row.get(0)?,
                    role: MessageRole::parse_name(&role).unwrap_or(MessageRole::User),
                    content: row.get(2)?,
                    timestamp_ms: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Write (or overwrite) a session summary, mirroring the recap onto
    /// the session row.
    pub fn write_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO session_summaries
             (session_id, user_id, summary, topics, message_count, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                summary.session_id,
                summary.user_id,
                summary.summary,
                serde_json::to_string(&summary.topics)?,
                summary.message_count,
                summary.duration_ms,
                summary.created_at,
            ],
        )?;
        tx.execute(
            "UPDATE sessions SET summary = ?2 WHERE id = ?1",
            params![summary.session_id, summary.summary],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
        let topics: String = row.get(3)?;
        Ok(SessionSummary {
            session_id: row.get(0)?,
            user_id: row.get(1)?,
            summary: row.get(2)?,
            topics: serde_json::from_str(&topics).unwrap_or_default(),
            message_count: row.get(4)?,
            duration_ms: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    /// Summaries for a user written since `since`, newest first.
    pub fn recent_session_summaries(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT session_id, user_id, summary, topics, message_count, duration_ms, created_at
             FROM session_summaries
             WHERE user_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC",
        )?;
        let summaries = stmt
            .query_map(params![user_id, since], Self::row_to_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Users with at least `min_count` summaries since `since`.
    pub fn users_with_recent_summaries(
        &self,
        since: DateTime<Utc>,
        min_count: i64,
    ) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT user_id FROM session_summaries
             WHERE created_at >= ?1
             GROUP BY user_id HAVING COUNT(*) >= ?2",
        )?;
        let users = stmt
            .query_map(params![since, min_count], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ========================================================================
    // SCHEDULED ITEMS
    // ========================================================================

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledItem> {
        let source: String = row.get(3)?;
        let kind: String = row.get(4)?;
        let context: Option<String> = row.get(7)?;
        let status: String = row.get(10)?;
        let board: Option<String> = row.get(11)?;
        let priority: String = row.get(12)?;
        let labels: String = row.get(13)?;
        let depends_on: String = row.get(14)?;
        let task_config: Option<String> = row.get(16)?;
        let result: Option<String> = row.get(17)?;
        Ok(ScheduledItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            source: crate::memory::ItemSource::parse_name(&source),
            kind: crate::memory::ItemKind::parse_name(&kind),
            item_type: row.get(5)?,
            message: row.get(6)?,
            context: context.as_deref().and_then(|c| serde_json::from_str(c).ok()),
            trigger_at: row.get(8)?,
            recurring: row.get(9)?,
            status: ItemStatus::parse_name(&status),
            board_status: board
                .as_deref()
                .and_then(BoardColumn::parse_name)
                .unwrap_or(BoardColumn::Backlog),
            priority: crate::memory::Priority::parse_name(&priority),
            labels: serde_json::from_str(&labels).unwrap_or_default(),
            depends_on: serde_json::from_str(&depends_on).unwrap_or_default(),
            goal_id: row.get(15)?,
            task_config: task_config.as_deref().and_then(|c| serde_json::from_str(c).ok()),
            result: result.as_deref().and_then(|c| serde_json::from_str(c).ok()),
            fired_at: row.get(18)?,
            completed_at: row.get(19)?,
            created_at: row.get(20)?,
            updated_at: row.get(21)?,
        })
    }

    /// Create a scheduled item, applying the default-column rule.
    pub fn add_scheduled_item(&self, draft: ScheduledItemDraft) -> Result<ScheduledItem> {
        draft.validate().map_err(StorageError::InvalidInput)?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let column = draft.default_column();
        let status = column.projected_status();
        {
            let writer = self.writer()?;
            writer.execute(
                "INSERT INTO scheduled_items (
                    id, user_id, session_id, source, kind, item_type, message, context,
                    trigger_at, recurring, status, board_status, priority, labels, depends_on,
                    goal_id, task_config, result, fired_at, completed_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, NULL, NULL, NULL, ?18, ?18)",
                params![
                    id,
                    draft.user_id,
                    draft.session_id,
                    draft.source.as_str(),
                    draft.kind.as_str(),
                    draft.item_type,
                    draft.message,
                    draft.context.as_ref().map(serde_json::Value::to_string),
                    draft.trigger_at,
                    draft.recurring,
                    status.as_str(),
                    column.as_str(),
                    draft.priority.as_str(),
                    serde_json::to_string(&draft.labels)?,
                    serde_json::to_string(&draft.depends_on)?,
                    draft.goal_id,
                    draft.task_config.as_ref().map(serde_json::Value::to_string),
                    now,
                ],
            )?;
        }
        self.get_scheduled_item(&id)?
            .ok_or_else(|| StorageError::NotFound(id))
    }

    /// Fetch one scheduled item by id.
    pub fn get_scheduled_item(&self, id: &str) -> Result<Option<ScheduledItem>> {
        let reader = self.reader()?;
        let item = reader
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM scheduled_items WHERE id = ?1"),
                params![id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// List a user's items, optionally filtered by status.
    pub fn list_scheduled_items(
        &self,
        user_id: &str,
        status: Option<ItemStatus>,
    ) -> Result<Vec<ScheduledItem>> {
        let reader = self.reader()?;
        let items = match status {
            Some(status) => {
                let mut stmt = reader.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM scheduled_items
                     WHERE user_id = ?1 AND status = ?2 ORDER BY created_at ASC"
                ))?;
                let rows = stmt
                    .query_map(params![user_id, status.as_str()], Self::row_to_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = reader.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM scheduled_items
                     WHERE user_id = ?1 ORDER BY created_at ASC"
                ))?;
                let rows = stmt
                    .query_map(params![user_id], Self::row_to_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(items)
    }

    /// Pending items whose trigger has passed, oldest trigger first,
    /// capped at `limit` (scheduler backpressure).
    pub fn due_pending_items(&self, now_ms: i64, limit: usize) -> Result<Vec<ScheduledItem>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM scheduled_items
             WHERE status = 'pending' AND trigger_at > 0 AND trigger_at <= ?1
             ORDER BY trigger_at ASC LIMIT ?2"
        ))?;
        let items = stmt
            .query_map(params![now_ms, limit as i64], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Column a status projects back onto, given the item's own fields.
    fn column_for_status(status: ItemStatus, item: &ScheduledItem) -> BoardColumn {
        match status {
            ItemStatus::Fired | ItemStatus::Acted => BoardColumn::Done,
            ItemStatus::Dismissed | ItemStatus::Expired => BoardColumn::Archived,
            ItemStatus::Processing => BoardColumn::InProgress,
            ItemStatus::Pending => {
                if item.trigger_at > 0 {
                    BoardColumn::Scheduled
                } else if item.source == crate::memory::ItemSource::Agent {
                    BoardColumn::Inbox
                } else {
                    BoardColumn::Backlog
                }
            }
        }
    }

    /// Drive the item state machine. Illegal transitions are a
    /// [`StorageError::Conflict`]; `fired_at` / `completed_at` are
    /// stamped on the way through.
    pub fn transition_item(
        &self,
        id: &str,
        next: ItemStatus,
        now_ms: i64,
    ) -> Result<ScheduledItem> {
        let item = self
            .get_scheduled_item(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        if item.status == next {
            return Ok(item);
        }
        if !item.status.can_transition_to(next) {
            return Err(StorageError::Conflict(format!(
                "illegal transition {} -> {} on item {id}",
                item.status, next
            )));
        }
        let column = Self::column_for_status(next, &item);
        let fired_at = match next {
            ItemStatus::Fired => Some(item.fired_at.unwrap_or(now_ms)),
            _ => item.fired_at,
        };
        {
            let writer = self.writer()?;
            writer.execute(
                "UPDATE scheduled_items SET status = ?2, board_status = ?3, fired_at = ?4,
                    updated_at = ?5
                 WHERE id = ?1",
                params![id, next.as_str(), column.as_str(), fired_at, Utc::now()],
            )?;
        }
        self.get_scheduled_item(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Explicit board move; the underlying status follows the
    /// projection table atomically.
    pub fn move_item_to_column(
        &self,
        id: &str,
        column: BoardColumn,
        now_ms: i64,
    ) -> Result<ScheduledItem> {
        let item = self
            .get_scheduled_item(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let status = column.projected_status();
        let fired_at = match status {
            ItemStatus::Fired => Some(item.fired_at.unwrap_or(now_ms)),
            _ => item.fired_at,
        };
        {
            let writer = self.writer()?;
            writer.execute(
                "UPDATE scheduled_items SET status = ?2, board_status = ?3, fired_at = ?4,
                    updated_at = ?5
                 WHERE id = ?1",
                params![id, status.as_str(), column.as_str(), fired_at, Utc::now()],
            )?;
        }
        self.get_scheduled_item(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Store a task run's result payload.
    pub fn set_item_result(
        &self,
        id: &str,
        result: &serde_json::Value,
        completed_ms: i64,
    ) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE scheduled_items SET result = ?2, completed_at = ?3, updated_at = ?4
             WHERE id = ?1",
            params![id, result.to_string(), completed_ms, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Move an item's trigger (recurrence re-scheduling).
    pub fn update_item_trigger(&self, id: &str, trigger_at: i64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE scheduled_items SET trigger_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, trigger_at, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Collapse near-duplicate pending items (word overlap at or above
    /// `threshold`), retaining the later of each pair. Returns how many
    /// items were dismissed. Running it twice removes nothing the
    /// second time.
    pub fn consolidate_pending_items(&self, user_id: &str, threshold: f64) -> Result<usize> {
        let pending = self.list_scheduled_items(user_id, Some(ItemStatus::Pending))?;
        let mut dismissed: Vec<String> = Vec::new();
        for i in 0..pending.len() {
            if dismissed.contains(&pending[i].id) {
                continue;
            }
            for j in (i + 1)..pending.len() {
                if dismissed.contains(&pending[j].id) {
                    continue;
                }
                if word_overlap(&pending[i].message, &pending[j].message) >= threshold {
                    // List is ordered by created_at ascending: i is older
                    dismissed.push(pending[i].id.clone());
                    break;
                }
            }
        }
        if dismissed.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE scheduled_items SET status = 'dismissed', board_status = 'archived',
                    updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
            )?;
            for id in &dismissed {
                stmt.execute(params![id, now])?;
            }
        }
        tx.commit()?;
        Ok(dismissed.len())
    }

    /// First pending item for the user whose message overlaps `message`
    /// at or above `threshold` (gap-notification dedup).
    pub fn find_similar_pending(
        &self,
        user_id: &str,
        message: &str,
        threshold: f64,
    ) -> Result<Option<ScheduledItem>> {
        let pending = self.list_scheduled_items(user_id, Some(ItemStatus::Pending))?;
        Ok(pending
            .into_iter()
            .find(|item| word_overlap(&item.message, message) >= threshold))
    }

    /// Count items of a status whose `fired_at` falls after `since_ms`
    /// (trust-score bookkeeping).
    pub fn count_items_since(
        &self,
        user_id: &str,
        status: ItemStatus,
        since_ms: i64,
    ) -> Result<i64> {
        let reader = self.reader()?;
        let count = reader.query_row(
            "SELECT COUNT(*) FROM scheduled_items
             WHERE user_id = ?1 AND status = ?2 AND COALESCE(fired_at, 0) >= ?3",
            params![user_id, status.as_str(), since_ms],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Archive fired items whose `fired_at` is older than `cutoff_ms`.
    pub fn auto_archive_fired_before(&self, cutoff_ms: i64) -> Result<usize> {
        let writer = self.writer()?;
        let archived = writer.execute(
            "UPDATE scheduled_items SET board_status = 'archived', updated_at = ?2
             WHERE status = 'fired' AND COALESCE(fired_at, 0) < ?1 AND board_status != 'archived'",
            params![cutoff_ms, Utc::now()],
        )?;
        Ok(archived)
    }

    // ========================================================================
    // BEHAVIORAL PATTERNS
    // ========================================================================

    /// Read a user's behavioral patterns, if any were recorded.
    pub fn get_patterns(&self, user_id: &str) -> Result<Option<BehavioralPatterns>> {
        let reader = self.reader()?;
        let data: Option<String> = reader
            .query_row(
                "SELECT data FROM behavioral_patterns WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Upsert a user's behavioral patterns. Callers treat failures as
    /// best-effort.
    pub fn put_patterns(&self, patterns: &BehavioralPatterns) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO behavioral_patterns (user_id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![patterns.user_id, serde_json::to_string(patterns)?, Utc::now()],
        )?;
        Ok(())
    }

    // ========================================================================
    // RAW QUERIES
    // ========================================================================

    /// Parameterized read-only query for ad-hoc inspection. Only SELECT
    /// statements are accepted.
    pub fn query_raw(
        &self,
        sql: &str,
        query_params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        if !sql.trim_start().to_lowercase().starts_with("select") {
            return Err(StorageError::InvalidInput(
                "query_raw accepts SELECT statements only".to_string(),
            ));
        }
        let reader = self.reader()?;
        let mut stmt = reader.prepare(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let rows = stmt
            .query_map(query_params, |row| {
                let mut object = serde_json::Map::new();
                for (index, name) in column_names.iter().enumerate() {
                    let value = match row.get_ref(index)? {
                        rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                        rusqlite::types::ValueRef::Integer(i) => serde_json::Value::from(i),
                        rusqlite::types::ValueRef::Real(f) => serde_json::Value::from(f),
                        rusqlite::types::ValueRef::Text(t) => {
                            serde_json::Value::from(String::from_utf8_lossy(t).to_string())
                        }
                        rusqlite::types::ValueRef::Blob(b) => serde_json::Value::from(b.len()),
                    };
                    object.insert(name.clone(), value);
                }
                Ok(object)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // GARDENER HISTORY
    // ========================================================================

    /// Record one gardener tick.
    pub fn record_gardener_run(&self, record: &GardenerRunRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO gardener_runs (
                tier, completed_at, duration_ms, memories_decayed, memories_archived,
                items_consolidated, clusters_fused, relations_minted, gaps_scheduled,
                insights_written, items_fired, failures
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.tier,
                Utc::now(),
                record.duration_ms,
                record.memories_decayed,
                record.memories_archived,
                record.items_consolidated,
                record.clusters_fused,
                record.relations_minted,
                record.gaps_scheduled,
                record.insights_written,
                record.items_fired,
                record.failures,
            ],
        )?;
        Ok(())
    }

    /// Completion time of the most recent run of a tier.
    pub fn last_gardener_run(&self, tier: &str) -> Result<Option<DateTime<Utc>>> {
        let reader = self.reader()?;
        let last = reader
            .query_row(
                "SELECT completed_at FROM gardener_runs WHERE tier = ?1
                 ORDER BY completed_at DESC LIMIT 1",
                params![tier],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last)
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    /// Engine-wide statistics.
    pub fn stats(&self) -> Result<MemoryStats> {
        let reader = self.reader()?;
        let total_memories: i64 =
            reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let latest_memories: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE is_latest = 1 AND kind != 'superseded'",
            [],
            |row| row.get(0),
        )?;
        let derived_memories: i64 = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE learned_from IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let average_prominence: f64 = reader.query_row(
            "SELECT COALESCE(AVG(prominence), 0.0) FROM memories
             WHERE is_latest = 1 AND kind != 'superseded'",
            [],
            |row| row.get(0),
        )?;
        let total_relations: i64 =
            reader.query_row("SELECT COUNT(*) FROM relations", [], |row| row.get(0))?;
        let total_sessions: i64 =
            reader.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        let pending_items: i64 = reader.query_row(
            "SELECT COUNT(*) FROM scheduled_items WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(MemoryStats {
            total_memories,
            latest_memories,
            derived_memories,
            average_prominence,
            total_relations,
            total_sessions,
            pending_items,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
