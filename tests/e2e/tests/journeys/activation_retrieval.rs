//! S3 - Spreading activation pulls in graph-adjacent memories
//!
//! A chain "lives in SF" -> "apartment in the Mission" -> "pays rent":
//! the rent entry shares no vocabulary with the query and can only
//! arrive through activation.

use std::sync::Arc;

use engram_core::{
    EmbeddingProvider, MatchKind, MemoryCategory, RetrievalConfig, RetrievalOptions,
    RetrievalPipeline,
};
use engram_e2e_tests::harness::TestDatabaseManager;
use engram_e2e_tests::mocks::MockEmbedder;

#[tokio::test]
async fn test_living_situation_query_surfaces_the_chain() {
    let db = TestDatabaseManager::new_temp();
    let embedder = Arc::new(MockEmbedder::new());

    let contents = [
        "User lives in San Francisco",
        "User's apartment is in Mission District",
        "User pays $3000 rent",
    ];
    let ids = db.seed_extends_chain("u1", &contents, MemoryCategory::Fact);

    // Stored embeddings come from the same mock the query will use
    for (id, content) in ids.iter().zip(contents.iter()) {
        let mut memory = db.store.get_memory(id).unwrap().unwrap();
        memory.embedding = Some(embedder.embed(content).await.unwrap());
        db.store.update_memory(&memory).unwrap();
    }

    let pipeline = RetrievalPipeline::new(
        db.store.clone(),
        Some(embedder),
        None,
        RetrievalConfig::full(),
    );
    let results = pipeline
        .retrieve(
            "Tell me about my living situation",
            "u1",
            &RetrievalOptions::default(),
        )
        .await
        .unwrap();

    // The direct match is present
    assert!(results
        .iter()
        .any(|result| result.memory.content.contains("San Francisco")));

    // At least one neighbor arrived through the graph; the rent entry
    // has no lexical or semantic path at all
    let rent = results
        .iter()
        .find(|result| result.memory.content.contains("rent"))
        .expect("rent memory surfaced via activation");
    assert_eq!(rent.match_kind, MatchKind::Graph);
}

#[tokio::test]
async fn test_unrelated_memories_stay_out_of_activation() {
    let db = TestDatabaseManager::new_temp();
    db.seed_extends_chain(
        "u1",
        &[
            "User lives in San Francisco",
            "User's apartment is in Mission District",
        ],
        MemoryCategory::Fact,
    );
    // An island with no edges and no shared vocabulary
    db.seed_memory("u1", "User drives a Toyota", MemoryCategory::Fact);

    let pipeline = RetrievalPipeline::new(db.store.clone(), None, None, RetrievalConfig::full());
    let results = pipeline
        .retrieve(
            "apartment in the Mission",
            "u1",
            &RetrievalOptions::default(),
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|result| !result.memory.content.contains("Toyota")));
}
