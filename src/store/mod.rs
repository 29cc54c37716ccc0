//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the index operations the ingestion and
//! retrieval pipeline needs, enabling pluggable backends:
//! - **[`sqlite::SqliteStore`]** — durable on-disk index (WAL journal,
//!   transactional per-article writes).
//! - **[`memory::MemoryStore`]** — in-memory index for tests.
//!
//! One collection holds one embedding space: the first vector written pins
//! `(dimension, model_id)`, and later writes that disagree are rejected
//! without touching the index. Query results are ordered by descending
//! cosine similarity, ties broken by chunk id ascending, so retrieval is
//! reproducible.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CollectionInfo, IndexEntry, RetrievedPassage};

/// Abstract vector index backend.
///
/// Implementations must be `Send + Sync`; writes must be atomic at the
/// operation granularity so concurrent readers never observe a
/// partially-written entry.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or update a single entry, keyed by chunk id.
    async fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    /// Remove an entry by chunk id. Unknown ids are a no-op.
    async fn delete(&self, chunk_id: &str) -> Result<()>;

    /// Atomically replace all entries for an article: existing chunks for
    /// `article_id` are removed and `entries` inserted in one unit, so the
    /// article is never partially visible. An empty slice just deletes.
    async fn replace_article(&self, article_id: i64, entries: &[IndexEntry]) -> Result<()>;

    /// Nearest-neighbor query: the `k` entries most similar to `vector`,
    /// descending by cosine similarity, ties by chunk id ascending.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedPassage>>;

    /// Content hashes of all chunks currently indexed for an article.
    async fn article_hashes(&self, article_id: i64) -> Result<HashSet<String>>;

    /// Entry count plus the pinned dimension/model, if established.
    async fn collection_info(&self) -> Result<CollectionInfo>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Sort candidates into the canonical result order (score descending,
/// chunk id ascending on ties) and truncate to `k`.
pub(crate) fn rank(mut candidates: Vec<RetrievedPassage>, k: usize) -> Vec<RetrievedPassage> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(k);
    candidates
}
