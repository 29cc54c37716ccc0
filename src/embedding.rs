//! Embedding provider abstraction and implementations.
//!
//! The [`Embedder`] trait is the single boundary to model inference, so the
//! backend can be swapped (including for a deterministic test double) and
//! so the concurrency and retry policy live in one place:
//!
//! - **`local`** ([`LocalEmbedder`]) — runs a frozen model in-process via
//!   fastembed; weights are downloaded once into the cache directory and
//!   everything after that is offline.
//! - **`ollama`** ([`OllamaEmbedder`]) — calls a local Ollama instance's
//!   `/api/embed` endpoint.
//!
//! [`EmbeddingService`] wraps a provider with the operational policy:
//! a semaphore caps concurrent inference calls (excess callers queue),
//! over-long inputs are rejected up front rather than silently truncated,
//! transient failures are retried with exponential backoff, and
//! [`EmbeddingService::embed_each`] isolates per-item failures so one bad
//! chunk cannot sink a whole batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Maps text to fixed-dimension vectors with a frozen, named model.
///
/// Implementations must be deterministic for identical input and model
/// version, and must preserve input order in [`Embedder::embed_batch`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model (e.g. `"all-minilm-l6-v2"`).
    fn model_id(&self) -> &str;
    /// Embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Instantiate the configured provider.
///
/// Fails with [`Error::ModelUnavailable`] if the provider is unknown, its
/// configuration is incomplete, or (for `local`) the model cannot load.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(Error::ModelUnavailable(
            "local embedding provider requires the local-embeddings feature".to_string(),
        )),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::ModelUnavailable(format!(
            "unknown embedding provider '{other}'"
        ))),
    }
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings")]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_id = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_id.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_id, dims)
}

#[cfg(feature = "local-embeddings")]
fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(Error::ModelUnavailable(format!(
            "unknown local embedding model: '{other}'. Supported: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large"
        ))),
    }
}

/// Embedding provider running a frozen model in-process.
///
/// The model is loaded once at construction; a load failure is fatal for
/// the caller (the service refuses to start without its model). Inference
/// runs on the blocking thread pool.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_id: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_id, dims) = resolve_local_model(config);
        let fastembed_model = to_fastembed_model(&model_id)?;

        let mut options =
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false);
        if let Some(dir) = &config.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            Error::ModelUnavailable(format!("failed to load local model '{model_id}': {e}"))
        })?;

        Ok(Self {
            model: Arc::new(std::sync::Mutex::new(model)),
            model_id,
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))?;
            guard
                .embed(texts, Some(batch_size))
                .map_err(|e| Error::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))?
    }
}

// ============ Ollama Provider ============

/// Embedding provider backed by a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`); requires an embedding model pulled there.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model_id: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_id = config.model.clone().ok_or_else(|| {
            Error::ModelUnavailable("embedding.model required for the ollama provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            Error::ModelUnavailable("embedding.dims required for the ollama provider".to_string())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ModelUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            url,
            model_id,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model_id,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Embedding(format!(
                    "ollama connection error (is Ollama running at {}?): {e}",
                    self.url
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "ollama API error {status}: {body_text}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::Embedding("invalid ollama response: missing embeddings array".to_string())
        })?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                Error::Embedding("invalid ollama response: embedding is not an array".to_string())
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }
    Ok(result)
}

// ============ Service wrapper ============

/// Operational wrapper around an [`Embedder`]: concurrency cap, input
/// validation, bounded retry, and per-item failure isolation.
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    max_retries: u32,
    max_input_chars: usize,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self {
            embedder,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            max_retries: config.max_retries.max(1),
            max_input_chars: config.max_input_chars,
        }
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn dims(&self) -> usize {
        self.embedder.dims()
    }

    /// Reject raw input exceeding the hard model limit.
    pub fn check_input(&self, text: &str) -> Result<()> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(Error::InvalidInput {
                len,
                max: self.max_input_chars,
            });
        }
        Ok(())
    }

    /// Probe the provider once; maps any failure to
    /// [`Error::ModelUnavailable`] so startup can abort instead of serving
    /// without a working model.
    pub async fn warmup(&self) -> Result<()> {
        let vector = self
            .attempt(&["warmup".to_string()])
            .await
            .map_err(|e| Error::ModelUnavailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModelUnavailable("empty warmup response".to_string()))?;

        if vector.len() != self.embedder.dims() {
            return Err(Error::ModelUnavailable(format!(
                "model '{}' produced {} dims, expected {}",
                self.embedder.model_id(),
                vector.len(),
                self.embedder.dims()
            )));
        }
        Ok(())
    }

    /// Embed a single text with validation and retry.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.check_input(text)?;
        let texts = [text.to_string()];
        let mut vectors = self.embed_with_retry(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    /// Embed a batch all-or-nothing: any invalid input or exhausted retry
    /// fails the whole call.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            self.check_input(text)?;
        }
        self.embed_with_retry(texts).await
    }

    /// Embed a batch with per-item isolation: the fast path is one batched
    /// call; if it fails, each item is retried individually so a single bad
    /// input only fails its own slot.
    pub async fn embed_each(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }

        if texts.iter().all(|t| self.check_input(t).is_ok()) {
            if let Ok(vectors) = self.attempt(texts).await {
                if vectors.len() == texts.len() {
                    return vectors.into_iter().map(Ok).collect();
                }
            }
        }

        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_one(text).await);
        }
        results
    }

    /// One inference call under the concurrency cap.
    async fn attempt(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Embedding("embedding queue closed".to_string()))?;
        self.embedder.embed_batch(texts).await
    }

    /// Retry transient inference failures with exponential backoff
    /// (1s, 2s, 4s, ... capped).
    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let delay = Duration::from_secs(1 << (attempt - 2).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.attempt(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "embedding attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Embedding("embedding failed".to_string())))
    }
}
