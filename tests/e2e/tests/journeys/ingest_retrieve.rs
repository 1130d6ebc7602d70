//! S1 - Ingest then retrieve by similarity
//!
//! Two unrelated memories; a food-preferences query must surface the
//! food entry and rank the car entry lower or drop it.

use std::sync::Arc;

use engram_core::{EngineConfig, MemoryDraft, MemoryEngine, RetrievalOptions};
use engram_e2e_tests::mocks::MockEmbedder;
use tempfile::TempDir;

fn engine(dir: &TempDir, embedder: Option<Arc<MockEmbedder>>) -> MemoryEngine {
    let config = EngineConfig {
        db_path: Some(dir.path().join("engram.db")),
        ..Default::default()
    };
    MemoryEngine::new(
        config,
        embedder.map(|e| e as Arc<dyn engram_core::EmbeddingProvider>),
        None,
        None,
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_food_query_finds_food_memory() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, Some(Arc::new(MockEmbedder::new())));

    engine
        .ingest(MemoryDraft::new("u1", "User loves Italian food"), Some(false))
        .await
        .unwrap();
    engine
        .ingest(MemoryDraft::new("u1", "User drives a Toyota"), Some(false))
        .await
        .unwrap();

    let results = engine
        .retrieve(
            "What are my food preferences?",
            "u1",
            &RetrievalOptions::default(),
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].memory.content, "User loves Italian food");

    // The Toyota entry is ranked lower or absent entirely
    if let Some(toyota) = results
        .iter()
        .find(|result| result.memory.content.contains("Toyota"))
    {
        assert!(toyota.score < results[0].score);
    }
}

#[tokio::test]
async fn test_retrieval_survives_embedder_outage() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, Some(Arc::new(MockEmbedder::failing())));

    engine
        .ingest(MemoryDraft::new("u1", "User loves Italian food"), Some(false))
        .await
        .unwrap();

    // Lexical path alone still answers
    let results = engine
        .retrieve("Italian food", "u1", &RetrievalOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].match_kind, engram_core::MatchKind::Lexical);
}

#[tokio::test]
async fn test_retrieval_bumps_access_counters() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, Some(Arc::new(MockEmbedder::new())));
    let (memory, _) = engine
        .ingest(MemoryDraft::new("u1", "User loves Italian food"), Some(false))
        .await
        .unwrap();

    engine
        .retrieve("Italian food", "u1", &RetrievalOptions::default())
        .await
        .unwrap();
    engine
        .retrieve("Italian food", "u1", &RetrievalOptions::default())
        .await
        .unwrap();

    let bumped = engine.store().get_memory(&memory.id).unwrap().unwrap();
    assert_eq!(bumped.access_count, 2);
    assert!(bumped.last_accessed_ms.is_some());
}
