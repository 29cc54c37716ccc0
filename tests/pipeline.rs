//! End-to-end pipeline tests: corpus → ingestion → index → retrieval →
//! sessions, exercised through the library API with a deterministic
//! embedding backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use common::{test_config, write_corpus, TermEmbedder, DIMS};

use lorekeeper::config::ChunkingConfig;
use lorekeeper::embedding::{Embedder, EmbeddingService};
use lorekeeper::error::{Error, Result};
use lorekeeper::ingest::Ingestor;
use lorekeeper::models::{Article, Chunk, Embedding, IndexEntry};
use lorekeeper::service::LoreService;
use lorekeeper::store::memory::MemoryStore;
use lorekeeper::store::sqlite::SqliteStore;
use lorekeeper::store::VectorStore;

const HERESY_BODY: &str = "The Horus Heresy began in M31.";
const THRONE_BODY: &str = "The Emperor sits upon the Golden Throne.";

async fn open_service(tmp: &TempDir, articles: &[(i64, &str, &str)]) -> LoreService {
    let config = test_config(tmp.path());
    write_corpus(&config.corpus.path, articles).await;
    LoreService::with_embedder(&config, Arc::new(TermEmbedder::new()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(
        &tmp,
        &[(1, "The Horus Heresy", HERESY_BODY), (2, "The Golden Throne", THRONE_BODY)],
    )
    .await;

    let first = service.ingest_corpus().await.unwrap();
    assert_eq!(first.articles_indexed, 2);
    assert!(first.failures.is_empty());
    let count_after_first = service.collection_info().await.unwrap().count;

    let second = service.ingest_corpus().await.unwrap();
    assert_eq!(second.articles_indexed, 0);
    assert_eq!(second.articles_skipped, 2);
    assert_eq!(
        service.collection_info().await.unwrap().count,
        count_after_first
    );
}

#[tokio::test]
async fn test_scenario_heresy_question_ranks_first() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(
        &tmp,
        &[(1, "The Horus Heresy", HERESY_BODY), (2, "The Golden Throne", THRONE_BODY)],
    )
    .await;
    service.ingest_corpus().await.unwrap();

    let context = service
        .answer_context("alice", "When did the Horus Heresy start?")
        .await
        .unwrap();

    assert!(context.degraded.is_none());
    assert!(!context.passages.is_empty());
    assert!(context.passages[0].text.contains("began in M31"));
    assert_eq!(context.passages[0].article_id, 1);
    assert_eq!(context.passages[0].title, "The Horus Heresy");

    // The turn landed in the session history with the retrieved ids.
    let history = service.history("alice").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "When did the Horus Heresy start?");
    assert_eq!(history[0].chunk_ids[0], context.passages[0].chunk_id);

    assert!(service.record_answer("alice", "It began in M31.").await);
    let history = service.history("alice").await;
    assert_eq!(history[0].answer.as_deref(), Some("It began in M31."));
}

#[tokio::test]
async fn test_empty_corpus_returns_empty_not_error() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(&tmp, &[]).await;

    let report = service.ingest_corpus().await.unwrap();
    assert_eq!(report.articles_seen, 0);

    let context = service
        .answer_context("alice", "Anything out there?")
        .await
        .unwrap();
    assert!(context.passages.is_empty());
    assert!(context.degraded.is_none());
}

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(
        &tmp,
        &[
            (1, "The Horus Heresy", HERESY_BODY),
            (2, "The Golden Throne", THRONE_BODY),
            (3, "Tyranids", "Tyranid hive fleets devour entire worlds."),
        ],
    )
    .await;
    service.ingest_corpus().await.unwrap();

    let ids = |ctx: &lorekeeper::service::AnswerContext| {
        ctx.passages
            .iter()
            .map(|p| p.chunk_id.clone())
            .collect::<Vec<_>>()
    };

    let first = service
        .answer_context("a", "tell me about the heresy")
        .await
        .unwrap();
    let second = service
        .answer_context("b", "tell me about the heresy")
        .await
        .unwrap();
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn test_reingest_replaces_changed_article() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    // Versions share the first paragraph; the second changes.
    let para_a = "Alpha paragraph about the siege of Terra and its defenders.";
    let para_b = "Beta paragraph about the traitor fleets closing in.";
    let para_c = "Gamma paragraph about the aftermath and the scouring.";
    let v1 = format!("{para_a}\n\n{para_b}");
    let v2 = format!("{para_a}\n\n{para_c}");

    let chunking = ChunkingConfig {
        max_chars: 60,
        overlap_chars: 0,
        min_chars: 10,
    };
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    let embeddings = Arc::new(EmbeddingService::new(
        Arc::new(TermEmbedder::new()),
        &config.embedding,
    ));
    let ingestor = Ingestor::new(Arc::clone(&embeddings), Arc::clone(&store), chunking);

    let article_v1 = Article {
        id: 1,
        title: "Siege of Terra".to_string(),
        body: v1.clone(),
        source_url: None,
    };
    let report = ingestor.ingest_articles(&[article_v1]).await;
    assert_eq!(report.chunks_written, 2);
    let hashes_v1 = store.article_hashes(1).await.unwrap();
    assert_eq!(hashes_v1.len(), 2);

    let article_v2 = Article {
        id: 1,
        title: "Siege of Terra".to_string(),
        body: v2.clone(),
        source_url: None,
    };
    let report = ingestor.ingest_articles(&[article_v2]).await;
    assert_eq!(report.articles_indexed, 1);

    let hashes_v2 = store.article_hashes(1).await.unwrap();
    assert_eq!(hashes_v2.len(), 2);
    // Shared paragraph kept, removed paragraph gone, new one present.
    let shared: Vec<_> = hashes_v1.intersection(&hashes_v2).collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(store.collection_info().await.unwrap().count, 2);
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let index_dir = tmp.path().join("index");
    let embedder = TermEmbedder::new();

    let entry = IndexEntry {
        chunk: Chunk {
            id: "c1".to_string(),
            article_id: 1,
            text: HERESY_BODY.to_string(),
            start_offset: 0,
            end_offset: HERESY_BODY.len(),
            content_hash: "h1".to_string(),
        },
        title: "The Horus Heresy".to_string(),
        source_url: Some("https://lore.example/wiki/1".to_string()),
        embedding: Embedding {
            vector: embedder.embed(HERESY_BODY),
            model_id: "term-hash-v1".to_string(),
        },
    };

    {
        let store = SqliteStore::open(&index_dir).await.unwrap();
        store.upsert(&entry).await.unwrap();
    }

    let store = SqliteStore::open(&index_dir).await.unwrap();
    let info = store.collection_info().await.unwrap();
    assert_eq!(info.count, 1);
    assert_eq!(info.dimension, Some(DIMS));
    assert_eq!(info.model_id.as_deref(), Some("term-hash-v1"));

    let results = store
        .query(&embedder.embed("When did the Horus Heresy start?"), 1)
        .await
        .unwrap();
    assert_eq!(results[0].chunk_id, "c1");
    assert_eq!(results[0].text, HERESY_BODY);
}

#[tokio::test]
async fn test_sqlite_store_rejects_dimension_mismatch() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&tmp.path().join("index")).await.unwrap();

    let entry = |id: &str, vector: Vec<f32>| IndexEntry {
        chunk: Chunk {
            id: id.to_string(),
            article_id: 1,
            text: "text".to_string(),
            start_offset: 0,
            end_offset: 4,
            content_hash: format!("h-{id}"),
        },
        title: "t".to_string(),
        source_url: None,
        embedding: Embedding {
            vector,
            model_id: "term-hash-v1".to_string(),
        },
    };

    store.upsert(&entry("c1", vec![1.0, 0.0, 0.0])).await.unwrap();

    let err = store
        .upsert(&entry("c2", vec![1.0, 0.0]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            got: 2,
            expected: 3
        }
    ));
    assert_eq!(store.collection_info().await.unwrap().count, 1);

    // replace_article is atomic: a bad vector mid-batch leaves the old
    // chunk set in place.
    let err = store
        .replace_article(1, &[entry("c3", vec![0.0, 1.0, 0.0]), entry("c4", vec![0.5, 0.5])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    let hashes = store.article_hashes(1).await.unwrap();
    assert_eq!(hashes, ["h-c1".to_string()].into_iter().collect());
}

#[tokio::test]
async fn test_model_mismatch_refused_at_startup() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(&tmp, &[(1, "The Horus Heresy", HERESY_BODY)]).await;
    service.ingest_corpus().await.unwrap();
    drop(service);

    let config = test_config(tmp.path());
    let err = LoreService::with_embedder(&config, Arc::new(TermEmbedder::with_model_id("v2-model")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModelMismatch { .. }));
}

#[tokio::test]
async fn test_oversize_question_is_a_hard_error() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(&tmp, &[(1, "The Horus Heresy", HERESY_BODY)]).await;
    service.ingest_corpus().await.unwrap();

    let question = "why ".repeat(200);
    let err = service.answer_context("alice", &question).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput { .. }));
    assert!(service.history("alice").await.is_empty());
}

/// Embedder that stalls on the marker question so a user's first turn is
/// still in flight when the second arrives.
struct SlowFirstEmbedder {
    inner: TermEmbedder,
}

#[async_trait]
impl Embedder for SlowFirstEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("first question")) {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn test_session_turns_commit_in_arrival_order() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_corpus(&config.corpus.path, &[(1, "The Horus Heresy", HERESY_BODY)]).await;

    let service = Arc::new(
        LoreService::with_embedder(
            &config,
            Arc::new(SlowFirstEmbedder {
                inner: TermEmbedder::new(),
            }),
        )
        .await
        .unwrap(),
    );
    service.ingest_corpus().await.unwrap();

    let s1 = Arc::clone(&service);
    let first = tokio::spawn(async move {
        s1.answer_context("alice", "first question about the heresy")
            .await
            .unwrap()
    });

    // Let the first turn take the session lock and stall in embedding.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let s2 = Arc::clone(&service);
    let second = tokio::spawn(async move {
        s2.answer_context("alice", "second question about the heresy")
            .await
            .unwrap()
    });

    first.await.unwrap();
    second.await.unwrap();

    let questions: Vec<String> = service
        .history("alice")
        .await
        .iter()
        .map(|t| t.question.clone())
        .collect();
    assert_eq!(
        questions,
        vec![
            "first question about the heresy".to_string(),
            "second question about the heresy".to_string()
        ]
    );
}

#[tokio::test]
async fn test_other_users_not_blocked_by_slow_turn() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_corpus(&config.corpus.path, &[(1, "The Horus Heresy", HERESY_BODY)]).await;

    let service = Arc::new(
        LoreService::with_embedder(
            &config,
            Arc::new(SlowFirstEmbedder {
                inner: TermEmbedder::new(),
            }),
        )
        .await
        .unwrap(),
    );
    service.ingest_corpus().await.unwrap();

    let s1 = Arc::clone(&service);
    let slow = tokio::spawn(async move {
        s1.answer_context("alice", "first question about the heresy")
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    // Bob's turn completes while Alice's is still stalled.
    let start = std::time::Instant::now();
    service
        .answer_context("bob", "quick heresy question")
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));

    slow.await.unwrap();
}

#[tokio::test]
async fn test_reingest_missing_article_reports_failure() {
    let tmp = TempDir::new().unwrap();
    let service = open_service(&tmp, &[(1, "The Horus Heresy", HERESY_BODY)]).await;

    let report = service.reingest_article(999).await.unwrap();
    assert_eq!(report.articles_seen, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].article_id, 999);
}
