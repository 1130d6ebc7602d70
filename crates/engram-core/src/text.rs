//! Shared text utilities
//!
//! Tokenization and overlap metrics used by the lexical scorer, the MMR
//! diversity pass, and scheduled-item deduplication. All callers must
//! agree on one tokenizer so overlap thresholds stay comparable.

use std::collections::HashSet;

/// Split on non-word characters, lowercase, drop empties.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Tokenize into a set for overlap computations.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard overlap of two token sets. Empty-vs-empty is 0.0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Jaccard overlap of two raw strings after tokenization.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    jaccard(&token_set(a), &token_set(b))
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}
