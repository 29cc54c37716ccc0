//! Error taxonomy for the retrieval pipeline.
//!
//! Library seams return these typed errors; the CLI wraps them in
//! `anyhow` for reporting. Degraded-but-answerable conditions
//! ([`Error::StoreUnavailable`], [`Error::RetrievalTimeout`]) are caught at
//! the service boundary and surfaced to the bot adapter as data rather than
//! bubbling out of a user's session.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The embedding model could not be loaded or reached. Fatal at startup.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A vector's dimension disagrees with the collection's established
    /// dimension. The offending write is rejected and the store unchanged.
    #[error("vector dimension mismatch: got {got}, collection uses {expected}")]
    DimensionMismatch { got: usize, expected: usize },

    /// The collection was indexed under a different model id. Mixing model
    /// versions in one collection is forbidden; re-index instead.
    #[error("collection was indexed with model '{stored}' but the provider is '{requested}'; re-index required")]
    ModelMismatch { stored: String, requested: String },

    /// The vector index could not be read or written.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// Retrieval exceeded its latency budget.
    #[error("retrieval timed out after {0:?}")]
    RetrievalTimeout(Duration),

    /// Raw input text exceeds the hard model limit. Never silently truncated.
    #[error("input of {len} characters exceeds the {max} character limit")]
    InvalidInput { len: usize, max: usize },

    /// The article corpus database could not be read.
    #[error("corpus store error: {0}")]
    Corpus(String),

    /// Embedding inference failed after retries.
    #[error("embedding failed: {0}")]
    Embedding(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
