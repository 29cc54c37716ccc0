//! Ingestion pipeline orchestration.
//!
//! Coordinates the offline flow: article → chunking → embedding → vector
//! index. Re-runs are idempotent (unchanged articles are detected by their
//! chunk-hash set and skipped), updated articles have their old chunks
//! replaced atomically, and one article's failure never aborts the batch.

use std::collections::HashSet;
use std::sync::Arc;

use crate::chunk::chunk_article;
use crate::config::ChunkingConfig;
use crate::corpus::ArticleStore;
use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::models::{Article, ArticleFailure, Embedding, IndexEntry, IngestReport};
use crate::store::VectorStore;

enum ArticleOutcome {
    /// Article (re)indexed with this many chunks.
    Indexed(usize),
    /// Chunk set identical to what the index already holds.
    Unchanged,
    /// Article has no indexable text and nothing stale to remove.
    Empty,
}

pub struct Ingestor {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl Ingestor {
    pub fn new(
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embeddings,
            store,
            chunking,
        }
    }

    /// Ingest every article in the corpus. Fails only if the corpus itself
    /// cannot be listed; per-article failures land in the report.
    pub async fn ingest_corpus(&self, corpus: &ArticleStore) -> Result<IngestReport> {
        let articles = corpus.list_articles().await?;
        Ok(self.ingest_articles(&articles).await)
    }

    /// Re-ingest a single article by id.
    pub async fn reingest_article(
        &self,
        corpus: &ArticleStore,
        article_id: i64,
    ) -> Result<IngestReport> {
        match corpus.get_article(article_id).await? {
            Some(article) => Ok(self.ingest_articles(&[article]).await),
            None => {
                let mut report = IngestReport::default();
                report.articles_seen = 1;
                report.failures.push(ArticleFailure {
                    article_id,
                    reason: "article not found in corpus".to_string(),
                });
                Ok(report)
            }
        }
    }

    /// Ingest a prepared set of articles, isolating per-article failures.
    pub async fn ingest_articles(&self, articles: &[Article]) -> IngestReport {
        let mut report = IngestReport {
            articles_seen: articles.len(),
            ..IngestReport::default()
        };

        for article in articles {
            match self.ingest_one(article).await {
                Ok(ArticleOutcome::Indexed(chunks)) => {
                    tracing::info!(article_id = article.id, chunks, "article indexed");
                    report.articles_indexed += 1;
                    report.chunks_written += chunks;
                }
                Ok(ArticleOutcome::Unchanged) | Ok(ArticleOutcome::Empty) => {
                    report.articles_skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(article_id = article.id, error = %e, "article ingestion failed, skipping");
                    report.failures.push(ArticleFailure {
                        article_id: article.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn ingest_one(&self, article: &Article) -> Result<ArticleOutcome> {
        let chunks = chunk_article(article.id, &article.body, &self.chunking);
        let existing = self.store.article_hashes(article.id).await?;

        if chunks.is_empty() {
            if existing.is_empty() {
                return Ok(ArticleOutcome::Empty);
            }
            // Body emptied since last ingest: drop the stale chunks.
            self.store.replace_article(article.id, &[]).await?;
            return Ok(ArticleOutcome::Indexed(0));
        }

        let new_hashes: HashSet<String> =
            chunks.iter().map(|c| c.content_hash.clone()).collect();
        if !existing.is_empty() && existing == new_hashes {
            return Ok(ArticleOutcome::Unchanged);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let results = self.embeddings.embed_each(&texts).await;

        let model_id = self.embeddings.model_id().to_string();
        let dims = self.embeddings.dims();
        let mut entries = Vec::with_capacity(chunks.len());

        for (chunk, result) in chunks.into_iter().zip(results) {
            let vector = result
                .map_err(|e| Error::Embedding(format!("chunk {}: {e}", chunk.id)))?;

            if vector.len() != dims {
                // Stays out of the staged set; the rest of the article commits.
                tracing::warn!(
                    chunk_id = %chunk.id,
                    got = vector.len(),
                    expected = dims,
                    "dimension mismatch, chunk skipped"
                );
                continue;
            }

            entries.push(IndexEntry {
                title: article.title.clone(),
                source_url: article.source_url.clone(),
                embedding: Embedding {
                    vector,
                    model_id: model_id.clone(),
                },
                chunk,
            });
        }

        let written = entries.len();
        self.store.replace_article(article.id, &entries).await?;
        Ok(ArticleOutcome::Indexed(written))
    }
}
