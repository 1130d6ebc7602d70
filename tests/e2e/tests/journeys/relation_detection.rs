//! S2 - Ingest-time relation detection
//!
//! First memory lands with detection off; the second, detection on,
//! must produce a typed relation between the persisted ids.

use std::sync::Arc;

use engram_core::{EngineConfig, MemoryDraft, MemoryEngine, RelationType};
use engram_e2e_tests::mocks::{MockEmbedder, MockLanguage};
use tempfile::TempDir;

const CLASSIFY_EXTENDS: &str = r#"{"type": "EXTENDS", "confidence": 0.85}"#;

fn engine(dir: &TempDir, language: Arc<MockLanguage>) -> MemoryEngine {
    let mut config = EngineConfig {
        db_path: Some(dir.path().join("engram.db")),
        ..Default::default()
    };
    // The bag-of-words mock embedder sits lower on the cosine scale
    // than a sentence model; widen the neighbor net accordingly.
    config.detection.extend_threshold = 0.3;
    MemoryEngine::new(
        config,
        Some(Arc::new(MockEmbedder::new())),
        Some(language),
        None,
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_salary_memory_relates_to_job_memory() {
    let dir = TempDir::new().unwrap();
    let language = Arc::new(MockLanguage::fixed(CLASSIFY_EXTENDS));
    let engine = engine(&dir, language.clone());

    let (job, relations) = engine
        .ingest(
            MemoryDraft::new("u1", "User got a new job at Google as a software engineer"),
            Some(false),
        )
        .await
        .unwrap();
    assert!(relations.is_empty());
    assert_eq!(language.call_count(), 0);

    let (salary, relations) = engine
        .ingest(
            MemoryDraft::new("u1", "User's salary at Google is $200k"),
            Some(true),
        )
        .await
        .unwrap();

    assert!(!relations.is_empty());
    let relation = &relations[0];
    assert_eq!(relation.source_id, salary.id);
    assert_eq!(relation.target_id, job.id);
    assert!(matches!(
        relation.relation_type,
        RelationType::Extends | RelationType::Updates
    ));
    assert!(relation.confidence > 0.3);

    // Persisted, not just returned
    assert!(engine.store().has_relation(&job.id, &salary.id).unwrap());
}

#[tokio::test]
async fn test_none_verdict_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let language = Arc::new(MockLanguage::fixed(
        r#"{"type": "NONE", "confidence": 0.9}"#,
    ));
    let engine = engine(&dir, language);

    engine
        .ingest(
            MemoryDraft::new("u1", "User got a new job at Google as a software engineer"),
            Some(false),
        )
        .await
        .unwrap();
    let (_, relations) = engine
        .ingest(
            MemoryDraft::new("u1", "User's salary at Google is $200k"),
            Some(true),
        )
        .await
        .unwrap();
    assert!(relations.is_empty());
    assert_eq!(engine.store().stats().unwrap().total_relations, 0);
}

#[tokio::test]
async fn test_detection_failure_never_blocks_ingest() {
    let dir = TempDir::new().unwrap();
    let language = Arc::new(MockLanguage::failing());
    let engine = engine(&dir, language);

    engine
        .ingest(
            MemoryDraft::new("u1", "User got a new job at Google as a software engineer"),
            Some(false),
        )
        .await
        .unwrap();
    // The entity write finishes before detection; a dead language
    // provider costs only the relation, never the memory.
    let (memory, relations) = engine
        .ingest(
            MemoryDraft::new("u1", "User's salary at Google is $200k"),
            Some(true),
        )
        .await
        .unwrap();
    assert!(relations.is_empty());
    assert!(engine.store().get_memory(&memory.id).unwrap().is_some());
}
