//! # Lorekeeper
//!
//! A retrieval-augmented grounding service over a fixed lore-article
//! corpus.
//!
//! Lorekeeper ingests articles from a read-only SQLite corpus, chunks and
//! embeds them with a frozen local model, and persists the vectors in a
//! durable index. At query time it embeds the question, runs top-k cosine
//! retrieval, and hands a bounded set of grounding passages to a bot
//! adapter, which combines them with a generation model to produce the
//! user-facing answer. Per-user sessions keep bounded conversation history
//! and serialize each user's turns.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Corpus  │──▶│   Ingestor    │──▶│  SQLite   │
//! │ (SQLite) │   │ Chunk+Embed  │   │ vec index │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                ┌──────────────┐   ┌─────┴─────┐
//!  bot adapter──▶│   Sessions    │──▶│ Retriever │
//!                └──────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lore init                     # create the vector index
//! lore ingest                   # chunk + embed the corpus
//! lore ask "Who is Horus?"      # one-shot retrieval
//! lore info                     # index statistics
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`corpus`] | Read-only article store |
//! | [`store`] | Vector index backends |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Top-k retrieval + context assembly |
//! | [`session`] | Per-user conversation state |
//! | [`service`] | Bot-adapter facade |

pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod service;
pub mod session;
pub mod store;
