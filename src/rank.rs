//! Cosine ranking of a query vector against a user's chunk pool.

use crate::ai::cosine_similarity;
use crate::db::Chunk;

/// Minimum cosine score a chunk must clear to be considered relevant.
/// Calibrated empirically against the pinned embedding model — a different
/// model has a different score distribution and needs recalibration, not a
/// blind copy of this constant.
pub const RELEVANCE_THRESHOLD: f64 = 0.30;

/// How many ranked chunks feed the context window.
pub const TOP_K: usize = 8;

/// A chunk with its similarity score against the query.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Score every candidate against the query, drop those below `threshold`,
/// sort descending (stable — ties keep candidate order), truncate to `top_k`.
///
/// An empty result is a valid outcome, not an error: either the pool was
/// empty or nothing cleared the threshold.
pub fn rank(
    query: &[f32],
    candidates: Vec<Chunk>,
    threshold: f64,
    top_k: usize,
) -> Vec<RankedChunk> {
    let mut ranked: Vec<RankedChunk> = candidates
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(query, &chunk.embedding);
            RankedChunk { chunk, score }
        })
        .filter(|rc| rc.score >= threshold)
        .collect();

    // sort_by is stable, so equal scores keep their original order
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);
    ranked
}
