//! Retrieval - hybrid scoring over the memory store
//!
//! Lexical (BM25) and semantic (cosine) scorers, MMR diversity, the
//! optional language re-rank, and the pipeline that fuses them with
//! prominence and spreading activation.

mod lexical;
mod mmr;
mod pipeline;
mod rerank;
mod vector;

pub use lexical::{Bm25Scorer, BM25_B, BM25_K1};
pub use mmr::{mmr_rerank, MmrCandidate};
pub use pipeline::{
    MatchKind, RetrievalConfig, RetrievalOptions, RetrievalPipeline, RetrievedMemory,
};
pub use rerank::{build_rerank_prompt, parse_rerank_scores, rerank_scores, RerankConfig};
pub use vector::{cosine_similarity, score_candidates};
