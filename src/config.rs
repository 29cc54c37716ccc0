use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Location of the article corpus database. Opened read-only.
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub path: PathBuf,
}

/// Directory holding the durable vector index files.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"local"` (fastembed) or `"ollama"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Model weights cache directory for the local provider.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent inference calls allowed; callers beyond the cap queue.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Hard per-text input limit; longer inputs are rejected, not truncated.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            cache_dir: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_input_chars() -> usize {
    8_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Overlap carried from one window into the next.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Windows shorter than this are discarded (single-chunk articles kept).
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    100
}
fn default_min_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Passages returned per query.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Candidate widening factor: the store is asked for `k * multiplier`.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Assembled context never exceeds this many characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Total latency budget (embedding + store query) in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// `"none"` (vector order is final) or `"lexical"`.
    #[serde(default = "default_rerank")]
    pub rerank: String,
    /// Blend weight for lexical re-ranking:
    /// `score = (1 - alpha) * lexical + alpha * vector`.
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            candidate_multiplier: default_candidate_multiplier(),
            max_context_chars: default_max_context_chars(),
            timeout_ms: default_timeout_ms(),
            rerank: default_rerank(),
            hybrid_alpha: default_hybrid_alpha(),
        }
    }
}

fn default_k() -> usize {
    6
}
fn default_candidate_multiplier() -> usize {
    4
}
fn default_max_context_chars() -> usize {
    8_000
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_rerank() -> String {
    "none".to_string()
}
fn default_hybrid_alpha() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Turns kept per session; oldest evicted beyond this.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Inactivity after which a session expires and its history is discarded.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_max_turns() -> usize {
    8
}
fn default_idle_timeout_secs() -> u64 {
    1800
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Embedded analytics in the model/hub libraries. Off unless re-enabled.
    #[serde(default = "default_telemetry_disabled")]
    pub disabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            disabled: default_telemetry_disabled(),
        }
    }
}

fn default_telemetry_disabled() -> bool {
    true
}

impl TelemetryConfig {
    /// Export the opt-out switches before any model/hub library initializes.
    /// Explicit operator settings in the environment win.
    pub fn apply(&self) {
        if !self.disabled {
            return;
        }
        for key in ["HF_HUB_DISABLE_TELEMETRY", "DO_NOT_TRACK"] {
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, "1");
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.candidate_multiplier < 1 {
        anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }
    match config.retrieval.rerank.as_str() {
        "none" | "lexical" => {}
        other => anyhow::bail!("Unknown rerank mode: '{}'. Must be none or lexical.", other),
    }

    match config.embedding.provider.as_str() {
        "local" => {}
        "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified for the ollama provider");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 for the ollama provider");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local or ollama.",
            other
        ),
    }
    if config.embedding.max_concurrency == 0 {
        anyhow::bail!("embedding.max_concurrency must be >= 1");
    }

    if config.session.max_turns == 0 {
        anyhow::bail!("session.max_turns must be >= 1");
    }

    Ok(config)
}
