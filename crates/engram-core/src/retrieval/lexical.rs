//! Lexical Scorer
//!
//! BM25 over memory content. Corpus statistics are computed from the
//! candidate set at query time rather than maintained globally, which
//! keeps scores correct after archival with no index bookkeeping.

use std::collections::HashMap;

use crate::text::tokenize;

/// BM25 term-frequency saturation
pub const BM25_K1: f64 = 1.2;
/// BM25 length normalization
pub const BM25_B: f64 = 0.75;

/// BM25 scorer over one candidate set
pub struct Bm25Scorer {
    documents: Vec<(String, Vec<String>)>,
    document_frequency: HashMap<String, usize>,
    average_length: f64,
}

impl Bm25Scorer {
    /// Build corpus statistics from (id, content) pairs.
    pub fn new<'a>(documents: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        let documents: Vec<(String, Vec<String>)> = documents
            .map(|(id, content)| (id.to_string(), tokenize(content)))
            .collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for (_, tokens) in &documents {
            let mut seen: Vec<&String> = Vec::new();
            for token in tokens {
                if !seen.contains(&token) {
                    *document_frequency.entry(token.clone()).or_insert(0) += 1;
                    seen.push(token);
                }
            }
        }

        let total_length: usize = documents.iter().map(|(_, tokens)| tokens.len()).sum();
        let average_length = if documents.is_empty() {
            1.0
        } else {
            (total_length as f64 / documents.len() as f64).max(1.0)
        };

        Self {
            documents,
            document_frequency,
            average_length,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.document_frequency.get(term).copied().unwrap_or(0) as f64;
        // BM25+ smoothing keeps the value positive for common terms
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Raw BM25 scores for every candidate, sorted descending. Documents
    /// with no query-term overlap score 0.0 and sort last.
    pub fn score(&self, query: &str) -> Vec<(String, f64)> {
        let query_terms = tokenize(query);
        let mut scores: Vec<(String, f64)> = self
            .documents
            .iter()
            .map(|(id, tokens)| {
                let length = tokens.len() as f64;
                let mut score = 0.0;
                for term in &query_terms {
                    let tf = tokens.iter().filter(|t| *t == term).count() as f64;
                    if tf > 0.0 {
                        let numerator = tf * (BM25_K1 + 1.0);
                        let denominator = tf
                            + BM25_K1 * (1.0 - BM25_B + BM25_B * (length / self.average_length));
                        score += self.idf(term) * numerator / denominator;
                    }
                }
                (id.clone(), score)
            })
            .collect();
        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores
    }

    /// Map raw scores to rank-normalized 1 / (1 + rank) over documents
    /// that matched at all. Zero-score documents stay at 0.0.
    pub fn rank_normalized(scores: &[(String, f64)]) -> HashMap<String, f64> {
        scores
            .iter()
            .filter(|(_, score)| *score > 0.0)
            .enumerate()
            .map(|(rank, (id, _))| (id.clone(), 1.0 / (1.0 + rank as f64)))
            .collect()
    }
}
