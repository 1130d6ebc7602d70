//! Language-model re-ranking
//!
//! Optional final stage of the retrieval pipeline: the top candidates go
//! to the language provider as a numbered list; the returned per-item
//! relevance scores reorder them. Any failure (transport, timeout,
//! unparseable output) falls back to the pre-rerank order.

use tokio::time::{timeout, Duration};

use crate::providers::{extract_json, CompletionRequest, LanguageProvider, ProviderError};

/// Configuration for the re-rank stage
#[derive(Debug, Clone)]
pub struct RerankConfig {
    /// Budget for the language call; deliberately shorter than ordinary
    /// LLM calls since re-ranking is a latency-sensitive refinement
    pub timeout_ms: u64,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 6_000,
            temperature: 0.0,
        }
    }
}

/// Build the numbered-list prompt.
pub fn build_rerank_prompt(query: &str, contents: &[String]) -> String {
    let mut prompt = format!(
        "Query: {query}\n\nRate how relevant each memory is to the query on a 0-10 scale.\n\n"
    );
    for (index, content) in contents.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", index + 1, content));
    }
    prompt.push_str(
        "\nReply with a JSON array of numbers, one score per memory, in the same order.",
    );
    prompt
}

/// Parse per-candidate scores out of the model's reply.
///
/// Accepts either a bare array of numbers or an array of
/// `{"index": n, "score": s}` objects (1-based indices). Returns None
/// when the reply cannot be mapped onto all `n` candidates.
pub fn parse_rerank_scores(text: &str, n: usize) -> Option<Vec<f64>> {
    let value = extract_json(text)?;
    let array = value.as_array()?;

    // Bare numbers in order
    if array.len() == n && array.iter().all(|v| v.is_number()) {
        return Some(array.iter().filter_map(|v| v.as_f64()).collect());
    }

    // Indexed objects
    let mut scores = vec![None; n];
    for entry in array {
        let index = entry.get("index")?.as_u64()? as usize;
        let score = entry.get("score")?.as_f64()?;
        if (1..=n).contains(&index) {
            scores[index - 1] = Some(score);
        }
    }
    scores.into_iter().collect()
}

/// Score `contents` against `query` via the language provider.
pub async fn rerank_scores(
    language: &dyn LanguageProvider,
    query: &str,
    contents: &[String],
    config: &RerankConfig,
) -> Result<Vec<f64>, ProviderError> {
    if contents.is_empty() {
        return Ok(Vec::new());
    }
    let system = "You are a relevance judge for a memory retrieval system. \
        Score each numbered memory against the query. Output only JSON.";
    let request = CompletionRequest::single_turn(system, build_rerank_prompt(query, contents))
        .with_temperature(config.temperature)
        .with_max_tokens(512);

    let completion = timeout(
        Duration::from_millis(config.timeout_ms),
        language.complete(request),
    )
    .await
    .map_err(|_| ProviderError::Timeout(config.timeout_ms))??;

    parse_rerank_scores(&completion.text(), contents.len())
        .ok_or_else(|| ProviderError::Model("unparseable rerank response".to_string()))
}
