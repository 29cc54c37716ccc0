//! Shared fixtures for the integration suite: a deterministic embedding
//! backend, a throwaway corpus database, and a ready-made config.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;

use lorekeeper::config::{
    ChunkingConfig, Config, CorpusConfig, EmbeddingConfig, IndexConfig, RetrievalConfig,
    SessionConfig, TelemetryConfig,
};
use lorekeeper::embedding::Embedder;
use lorekeeper::error::Result;

pub const DIMS: usize = 256;

/// Deterministic bag-of-terms embedder: each term hashes (FNV-1a) to one of
/// `DIMS` buckets and the vector is L2-normalized. Texts sharing terms get
/// high cosine similarity, so retrieval behaves sensibly without a model.
pub struct TermEmbedder {
    model_id: String,
}

impl TermEmbedder {
    pub fn new() -> Self {
        Self::with_model_id("term-hash-v1")
    }

    pub fn with_model_id(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMS];
        for term in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[fnv1a(term) as usize % DIMS] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Embedder for TermEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Create (or update) a corpus database with the given
/// `(id, title, body)` rows.
pub async fn write_corpus(path: &Path, articles: &[(i64, &str, &str)]) {
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        path.display()
    ))
    .unwrap()
    .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY,
            final_title TEXT NOT NULL,
            content TEXT NOT NULL,
            article_url TEXT
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    for (id, title, body) in articles.iter().copied() {
        sqlx::query(
            "INSERT OR REPLACE INTO articles (id, final_title, content, article_url) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(body)
        .bind(format!("https://lore.example/wiki/{id}"))
        .execute(&pool)
        .await
        .unwrap();
    }

    pool.close().await;
}

/// Config rooted in a temp directory, tuned for small fixture articles.
pub fn test_config(root: &Path) -> Config {
    Config {
        corpus: CorpusConfig {
            path: root.join("corpus.sqlite"),
        },
        index: IndexConfig {
            dir: root.join("index"),
        },
        embedding: EmbeddingConfig {
            max_input_chars: 500,
            ..EmbeddingConfig::default()
        },
        chunking: ChunkingConfig {
            max_chars: 200,
            overlap_chars: 20,
            min_chars: 10,
        },
        retrieval: RetrievalConfig {
            k: 3,
            ..RetrievalConfig::default()
        },
        session: SessionConfig {
            max_turns: 4,
            idle_timeout_secs: 60,
        },
        telemetry: TelemetryConfig::default(),
    }
}
