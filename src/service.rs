//! The service facade the bot adapter talks to.
//!
//! [`LoreService`] owns the shared resources — embedding service, vector
//! index, corpus reader, session arena — and exposes one query-time
//! operation, [`LoreService::answer_context`], plus the operator-triggered
//! ingestion entry points.
//!
//! Startup is strict: the embedding model must load (a warmup probe runs
//! before anything is served) and an existing index must have been built by
//! the same model. Query time is lenient: store outages and timeouts come
//! back as a degraded [`AnswerContext`] with empty passages so the adapter
//! can phrase a "temporarily unavailable" reply, and the user's session
//! history stays intact.

use std::sync::Arc;

use crate::config::Config;
use crate::corpus::ArticleStore;
use crate::embedding::{create_embedder, Embedder, EmbeddingService};
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::models::{CollectionInfo, IngestReport, RetrievedPassage};
use crate::retrieve::Retriever;
use crate::session::{SessionManager, Turn};
use crate::store::sqlite::SqliteStore;
use crate::store::VectorStore;

/// Grounding passages for one question, plus the retrieval condition.
///
/// `degraded` is `None` on a healthy retrieval. When the store is down or
/// the latency budget expired, it carries the condition and `passages` is
/// empty — the adapter decides how to phrase the degraded reply.
#[derive(Debug)]
pub struct AnswerContext {
    pub passages: Vec<RetrievedPassage>,
    pub degraded: Option<Error>,
}

pub struct LoreService {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    corpus: ArticleStore,
    retriever: Retriever,
    ingestor: Ingestor,
    sessions: SessionManager,
    retrieval_k: usize,
    max_context_chars: usize,
}

impl std::fmt::Debug for LoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoreService")
            .field("model_id", &self.embeddings.model_id())
            .field("retrieval_k", &self.retrieval_k)
            .field("max_context_chars", &self.max_context_chars)
            .finish_non_exhaustive()
    }
}

impl LoreService {
    /// Full startup path: configured provider, durable index, corpus.
    pub async fn open(config: &Config) -> Result<Self> {
        config.telemetry.apply();
        let embedder = create_embedder(&config.embedding)?;
        Self::with_embedder(config, embedder).await
    }

    /// Startup with a caller-supplied embedding backend. This is the seam
    /// tests use to swap in a deterministic model.
    pub async fn with_embedder(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let embeddings = Arc::new(EmbeddingService::new(embedder, &config.embedding));
        embeddings.warmup().await?;

        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open(&config.index.dir).await?);

        // A collection built by a different model is unusable; refuse early.
        let info = store.collection_info().await?;
        if let Some(stored) = info.model_id {
            if stored != embeddings.model_id() {
                return Err(Error::ModelMismatch {
                    stored,
                    requested: embeddings.model_id().to_string(),
                });
            }
        }

        let corpus = ArticleStore::open(&config.corpus.path).await?;

        let retriever = Retriever::new(
            Arc::clone(&embeddings),
            Arc::clone(&store),
            config.retrieval.clone(),
        );
        let ingestor = Ingestor::new(
            Arc::clone(&embeddings),
            Arc::clone(&store),
            config.chunking.clone(),
        );
        let sessions = SessionManager::new(&config.session);

        Ok(Self {
            embeddings,
            store,
            corpus,
            retriever,
            ingestor,
            sessions,
            retrieval_k: config.retrieval.k,
            max_context_chars: config.retrieval.max_context_chars,
        })
    }

    /// Retrieve grounding passages for a user's question and commit the
    /// turn to their session history.
    ///
    /// Per-user turns are strictly ordered: the session lock is taken for
    /// retrieval plus history commit, so a second message from the same
    /// user waits for the first commit while other users run in parallel.
    /// The retrieval latency budget bounds how long the lock is held.
    pub async fn answer_context(&self, user_id: &str, question: &str) -> Result<AnswerContext> {
        self.embeddings.check_input(question)?;

        let slot = self.sessions.session(user_id).await;
        let mut session = slot.lock().await;

        match self
            .retriever
            .retrieve(question, self.retrieval_k, self.max_context_chars)
            .await
        {
            Ok(passages) => {
                session.commit_turn(
                    Turn {
                        question: question.to_string(),
                        chunk_ids: passages.iter().map(|p| p.chunk_id.clone()).collect(),
                        answer: None,
                    },
                    self.sessions.max_turns(),
                );
                Ok(AnswerContext {
                    passages,
                    degraded: None,
                })
            }
            Err(
                e @ (Error::StoreUnavailable(_)
                | Error::RetrievalTimeout(_)
                | Error::Embedding(_)),
            ) => {
                tracing::warn!(user_id, error = %e, "retrieval degraded");
                Ok(AnswerContext {
                    passages: Vec::new(),
                    degraded: Some(e),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Attach the adapter's generated answer to the user's latest turn.
    pub async fn record_answer(&self, user_id: &str, answer: &str) -> bool {
        self.sessions.record_answer(user_id, answer).await
    }

    /// Snapshot of a user's session history, oldest first.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        self.sessions.history(user_id).await
    }

    /// Operator-triggered full corpus ingestion.
    pub async fn ingest_corpus(&self) -> Result<IngestReport> {
        self.ingestor.ingest_corpus(&self.corpus).await
    }

    /// Operator-triggered re-ingestion of one article.
    pub async fn reingest_article(&self, article_id: i64) -> Result<IngestReport> {
        self.ingestor.reingest_article(&self.corpus, article_id).await
    }

    pub async fn collection_info(&self) -> Result<CollectionInfo> {
        self.store.collection_info().await
    }

    pub async fn corpus_size(&self) -> Result<u64> {
        self.corpus.count().await
    }
}
