//! In-memory [`VectorStore`] implementation for tests.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`; similarity search is
//! brute-force cosine over all stored vectors. Enforces the same
//! dimension/model pinning rules as the durable store.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{CollectionInfo, IndexEntry, RetrievedPassage};

use super::{cosine_similarity, rank, VectorStore};

#[derive(Default)]
struct Inner {
    dimension: Option<usize>,
    model_id: Option<String>,
    entries: HashMap<String, IndexEntry>,
}

impl Inner {
    fn ensure_meta(&mut self, dims: usize, model_id: &str) -> Result<()> {
        match (self.dimension, self.model_id.as_deref()) {
            (Some(d), Some(m)) => {
                if d != dims {
                    return Err(Error::DimensionMismatch {
                        got: dims,
                        expected: d,
                    });
                }
                if m != model_id {
                    return Err(Error::ModelMismatch {
                        stored: m.to_string(),
                        requested: model_id.to_string(),
                    });
                }
            }
            _ => {
                self.dimension = Some(dims);
                self.model_id = Some(model_id.to_string());
            }
        }
        Ok(())
    }
}

/// In-memory vector index for unit and integration tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.ensure_meta(entry.embedding.vector.len(), &entry.embedding.model_id)?;
        inner.entries.insert(entry.chunk.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> Result<()> {
        self.inner.write().unwrap().entries.remove(chunk_id);
        Ok(())
    }

    async fn replace_article(&self, article_id: i64, entries: &[IndexEntry]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        // Validate the whole batch before mutating anything.
        for entry in entries {
            match (inner.dimension, inner.model_id.as_deref()) {
                (Some(d), _) if d != entry.embedding.vector.len() => {
                    return Err(Error::DimensionMismatch {
                        got: entry.embedding.vector.len(),
                        expected: d,
                    });
                }
                (_, Some(m)) if m != entry.embedding.model_id => {
                    return Err(Error::ModelMismatch {
                        stored: m.to_string(),
                        requested: entry.embedding.model_id.clone(),
                    });
                }
                _ => {}
            }
        }
        inner
            .entries
            .retain(|_, e| e.chunk.article_id != article_id);
        for entry in entries {
            inner.ensure_meta(entry.embedding.vector.len(), &entry.embedding.model_id)?;
            inner.entries.insert(entry.chunk.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        let inner = self.inner.read().unwrap();
        match inner.dimension {
            None => return Ok(Vec::new()),
            Some(d) if d != vector.len() => {
                return Err(Error::DimensionMismatch {
                    got: vector.len(),
                    expected: d,
                });
            }
            _ => {}
        }

        let candidates: Vec<RetrievedPassage> = inner
            .entries
            .values()
            .map(|e| RetrievedPassage {
                chunk_id: e.chunk.id.clone(),
                article_id: e.chunk.article_id,
                title: e.title.clone(),
                source_url: e.source_url.clone(),
                text: e.chunk.text.clone(),
                score: cosine_similarity(vector, &e.embedding.vector),
            })
            .collect();

        Ok(rank(candidates, k))
    }

    async fn article_hashes(&self, article_id: i64) -> Result<HashSet<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .entries
            .values()
            .filter(|e| e.chunk.article_id == article_id)
            .map(|e| e.chunk.content_hash.clone())
            .collect())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let inner = self.inner.read().unwrap();
        Ok(CollectionInfo {
            count: inner.entries.len() as u64,
            dimension: inner.dimension,
            model_id: inner.model_id.clone(),
        })
    }
}
