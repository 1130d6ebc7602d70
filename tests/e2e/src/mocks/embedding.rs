//! Deterministic mock embedding provider
//!
//! Bag-of-words hashing with a small concept table: words in the same
//! concept group fold onto one bucket, so paraphrases ("lives" /
//! "living situation") land close in cosine space the way a real
//! sentence embedder would place them.

use async_trait::async_trait;
use engram_core::{EmbeddingProvider, ProviderError};

const DIMENSIONS: usize = 64;

/// Words folded onto a shared bucket before hashing
const CONCEPTS: &[&[&str]] = &[
    &["live", "lives", "living", "home", "housing", "apartment"],
    &["food", "eat", "eats", "eating", "cuisine", "meal", "meals"],
    &["job", "work", "works", "working", "career", "salary"],
    &["coffee", "espresso", "roast"],
    &["goal", "goals", "plan", "plans"],
];

fn fold_concept(token: &str) -> &str {
    for group in CONCEPTS {
        if group.contains(&token) {
            return group[0];
        }
    }
    token
}

fn fnv(token: &str) -> u64 {
    let mut hash: u64 = 1469598103934665603;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

/// Deterministic embedding provider for tests
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder {
    /// When true, every call fails (degradation tests)
    pub fail: bool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.fail {
            return Err(ProviderError::Unavailable("mock embedder down".to_string()));
        }
        let mut vector = vec![0.0f32; DIMENSIONS];
        for token in engram_core::text::tokenize(text) {
            let folded = fold_concept(&token);
            vector[(fnv(folded) % DIMENSIONS as u64) as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIMENSIONS
    }

    fn is_available(&self) -> bool {
        !self.fail
    }
}
