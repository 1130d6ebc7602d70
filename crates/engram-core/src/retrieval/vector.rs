//! Vector Scorer
//!
//! Pure cosine similarity over stored embeddings. Candidates without
//! embeddings are excluded from semantic scoring; they stay eligible
//! through the lexical path.

/// Cosine similarity between two vectors.
///
/// Mismatched dimensions or zero-norm inputs score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score candidates against a query embedding, skipping candidates
/// without vectors. Returns (id, similarity) sorted descending.
pub fn score_candidates<'a>(
    query: &[f32],
    candidates: impl Iterator<Item = (&'a str, Option<&'a [f32]>)>,
) -> Vec<(String, f32)> {
    let mut scores: Vec<(String, f32)> = candidates
        .filter_map(|(id, embedding)| {
            embedding.map(|e| (id.to_string(), cosine_similarity(query, e)))
        })
        .collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_opposite() {
        let similarity = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((similarity + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_score_candidates_skips_missing_embeddings() {
        let query = vec![1.0, 0.0];
        let a = vec![1.0, 0.0];
        let b = vec![0.5, 0.5];
        let candidates: Vec<(&str, Option<&[f32]>)> = vec![
            ("a", Some(a.as_slice())),
            ("no-embedding", None),
            ("b", Some(b.as_slice())),
        ];
        let scores = score_candidates(&query, candidates.into_iter());
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].0, "a");
    }
}
