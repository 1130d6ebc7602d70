//! Embedding capability
//!
//! Produces fixed-dimension vectors for memory content and queries.
//! Implementations live outside the core (local ONNX runtimes, hosted
//! APIs); tests use a deterministic mock.

use async_trait::async_trait;

use super::ProviderError;

/// Capability contract for producing fixed-dimension embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed a batch of texts, preserving order.
    ///
    /// The default implementation loops over [`embed`](Self::embed);
    /// providers with a native batch endpoint should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Declared output dimension.
    fn dimension(&self) -> usize;

    /// Availability probe. The retrieval pipeline degrades to
    /// lexical-only scoring when this returns false.
    fn is_available(&self) -> bool {
        true
    }
}
