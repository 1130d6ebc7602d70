//! Journey smoke test: the engine boots against a fresh database and
//! reports empty stats.

use engram_core::{EngineConfig, MemoryEngine};
use tempfile::TempDir;

#[tokio::test]
async fn test_engine_boots_on_fresh_database() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        db_path: Some(dir.path().join("engram.db")),
        ..Default::default()
    };
    let engine = MemoryEngine::new(config, None, None, None, None).unwrap();

    let stats = engine.store().stats().unwrap();
    assert_eq!(stats.total_memories, 0);
    assert_eq!(stats.pending_items, 0);

    // Retrieval against an empty store degrades to an empty result
    let results = engine
        .retrieve("anything at all", "nobody", &Default::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_engine_reopens_existing_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engram.db");
    {
        let config = EngineConfig {
            db_path: Some(path.clone()),
            ..Default::default()
        };
        let engine = MemoryEngine::new(config, None, None, None, None).unwrap();
        engine
            .ingest(
                engram_core::MemoryDraft::new("u1", "persistent fact"),
                Some(false),
            )
            .await
            .unwrap();
    }
    // Reopen: migrations are idempotent and data survives
    let config = EngineConfig {
        db_path: Some(path),
        ..Default::default()
    };
    let engine = MemoryEngine::new(config, None, None, None, None).unwrap();
    assert_eq!(engine.store().stats().unwrap().total_memories, 1);
}
