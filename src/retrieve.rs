//! Query-time retrieval: embed, search, re-rank, assemble context.
//!
//! The retriever embeds the query, asks the store for a widened candidate
//! set (`k * candidate_multiplier`), optionally re-ranks by blending the
//! vector score with a lexical term-overlap signal, takes the top `k`, and
//! assembles a context bounded by `max_context_chars` — dropping the
//! lowest-ranked chunks whole rather than ever truncating mid-chunk.
//!
//! The entire call runs under a latency budget; on expiry the caller gets
//! [`Error::RetrievalTimeout`] instead of an indefinitely held session.
//!
//! Results are deterministic for a fixed index snapshot and query: scores
//! come from a frozen model, and ties are broken by chunk id ascending.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::models::RetrievedPassage;
use crate::store::VectorStore;

pub struct Retriever {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embeddings,
            store,
            config,
        }
    }

    /// Retrieve up to `k` passages for `query`, with the assembled context
    /// capped at `max_context_chars`. An empty query or empty index yields
    /// an empty list, not an error.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        max_context_chars: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let budget = Duration::from_millis(self.config.timeout_ms);
        let ranked = match tokio::time::timeout(budget, self.search(query, k)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::RetrievalTimeout(budget)),
        };

        Ok(assemble_context(ranked, max_context_chars))
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let query_vec = self.embeddings.embed_one(query).await?;

        let candidate_k = k.saturating_mul(self.config.candidate_multiplier.max(1));
        let candidates = self.store.query(&query_vec, candidate_k).await?;

        let ranked = match self.config.rerank.as_str() {
            "lexical" => rerank_lexical(query, candidates, self.config.hybrid_alpha),
            _ => candidates,
        };

        Ok(ranked.into_iter().take(k).collect())
    }
}

/// Keep passages in rank order until the character budget would be
/// exceeded; everything from the first overflowing chunk down is dropped.
fn assemble_context(
    ranked: Vec<RetrievedPassage>,
    max_context_chars: usize,
) -> Vec<RetrievedPassage> {
    let mut out = Vec::new();
    let mut used = 0usize;

    for passage in ranked {
        let len = passage.text.chars().count();
        if used + len > max_context_chars {
            break;
        }
        used += len;
        out.push(passage);
    }

    out
}

/// Blend vector similarity with a query-term overlap signal:
/// `score = (1 - alpha) * lexical + alpha * vector`, both min-max
/// normalized to `[0, 1]` first.
fn rerank_lexical(
    query: &str,
    candidates: Vec<RetrievedPassage>,
    alpha: f64,
) -> Vec<RetrievedPassage> {
    if candidates.is_empty() {
        return candidates;
    }

    let terms: HashSet<String> = query_terms(query);
    if terms.is_empty() {
        return candidates;
    }

    let lexical_raw: Vec<f64> = candidates
        .iter()
        .map(|c| {
            let text = c.text.to_lowercase();
            terms.iter().filter(|t| text.contains(t.as_str())).count() as f64
                / terms.len() as f64
        })
        .collect();
    let vector_raw: Vec<f64> = candidates.iter().map(|c| c.score as f64).collect();

    let lexical = normalize(&lexical_raw);
    let vector = normalize(&vector_raw);

    let mut rescored: Vec<RetrievedPassage> = candidates
        .into_iter()
        .zip(lexical.iter().zip(vector.iter()))
        .map(|(mut passage, (l, v))| {
            passage.score = ((1.0 - alpha) * l + alpha * v) as f32;
            passage
        })
        .collect();

    rescored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    rescored
}

fn query_terms(query: &str) -> HashSet<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Min-max normalize raw scores to `[0.0, 1.0]`; all-equal sets collapse
/// to `1.0`.
fn normalize(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let s_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|&s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}
