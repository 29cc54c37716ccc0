//! Core data models used throughout lorekeeper.
//!
//! These types represent the articles, chunks, and retrieved passages that
//! flow through the ingestion and retrieval pipeline.

use serde::Serialize;

/// A lore article as stored in the corpus database.
///
/// Articles are immutable once ingested; the source of truth lives in the
/// corpus store, which lorekeeper only ever reads.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub source_url: Option<String>,
}

/// A bounded span of an article's body, the unit of embedding and retrieval.
///
/// Offsets are byte positions into the article body (always on UTF-8
/// character boundaries). `content_hash` is the SHA-256 of the chunk text;
/// the id is derived deterministically from `(article_id, start_offset,
/// content_hash)`, so re-chunking identical text yields identical ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub article_id: i64,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub content_hash: String,
}

/// A fixed-dimension vector produced by a frozen embedding model.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_id: String,
}

/// A chunk plus its embedding and article metadata, as persisted in the
/// vector index. Keyed by chunk id.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub title: String,
    pub source_url: Option<String>,
    pub embedding: Embedding,
}

/// A retrieved chunk with its relevance score and article reference.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    pub chunk_id: String,
    pub article_id: i64,
    pub title: String,
    pub source_url: Option<String>,
    pub text: String,
    pub score: f32,
}

/// Collection-level metadata reported by a vector store.
///
/// `dimension` and `model_id` are `None` until the first vector establishes
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub count: u64,
    pub dimension: Option<usize>,
    pub model_id: Option<String>,
}

/// Outcome of an ingestion run. Per-article failures are collected here
/// rather than aborting the batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub articles_seen: usize,
    pub articles_indexed: usize,
    pub articles_skipped: usize,
    pub chunks_written: usize,
    pub failures: Vec<ArticleFailure>,
}

#[derive(Debug)]
pub struct ArticleFailure {
    pub article_id: i64,
    pub reason: String,
}
