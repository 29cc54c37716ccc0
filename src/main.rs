//! # Lorekeeper CLI (`lore`)
//!
//! Operator interface for the retrieval service: index initialization,
//! corpus ingestion, one-shot retrieval, and index statistics. The bot
//! adapter itself links against the library and is not part of this
//! binary.
//!
//! ## Usage
//!
//! ```bash
//! lore --config ./config/lore.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lore init` | Create the vector index and run schema migrations |
//! | `lore ingest` | Chunk, embed, and index the whole corpus |
//! | `lore reingest <article-id>` | Re-ingest a single article |
//! | `lore ask "<question>"` | Retrieve grounding passages for a question |
//! | `lore info` | Show collection statistics |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lorekeeper::config::load_config;
use lorekeeper::models::IngestReport;
use lorekeeper::service::LoreService;
use lorekeeper::store::sqlite::SqliteStore;
use lorekeeper::store::VectorStore;

/// Lorekeeper — retrieval-augmented grounding over a fixed lore corpus.
#[derive(Parser)]
#[command(
    name = "lore",
    about = "Retrieval-augmented grounding service over a fixed lore-article corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector index.
    ///
    /// Creates the index directory and database file with all required
    /// tables. Idempotent — running it multiple times is safe.
    Init,

    /// Ingest the whole corpus: chunk, embed, and index every article.
    ///
    /// Re-runs are idempotent; unchanged articles are skipped and updated
    /// articles have their chunks replaced.
    Ingest,

    /// Re-ingest a single article by corpus id.
    Reingest { article_id: i64 },

    /// Retrieve grounding passages for a question.
    Ask {
        question: String,

        /// Session user id to record the turn under.
        #[arg(long, default_value = "operator")]
        user: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show collection statistics.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&config.index.dir).await?;
            let info = store.collection_info().await?;
            println!("index initialized at {}", config.index.dir.display());
            println!("  entries: {}", info.count);
            Ok(())
        }

        Commands::Ingest => {
            let service = LoreService::open(&config).await?;
            let report = service.ingest_corpus().await?;
            print_report("ingest", &report);
            Ok(())
        }

        Commands::Reingest { article_id } => {
            let service = LoreService::open(&config).await?;
            let report = service.reingest_article(article_id).await?;
            print_report(&format!("reingest {article_id}"), &report);
            Ok(())
        }

        Commands::Ask {
            question,
            user,
            json,
        } => {
            let service = LoreService::open(&config).await?;
            let context = service.answer_context(&user, &question).await?;

            if let Some(condition) = &context.degraded {
                println!("degraded: {condition}");
                return Ok(());
            }

            if context.passages.is_empty() {
                println!("No passages found.");
                return Ok(());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&context.passages)?);
                return Ok(());
            }

            for (i, passage) in context.passages.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (article {})",
                    i + 1,
                    passage.score,
                    passage.title,
                    passage.article_id
                );
                if let Some(url) = &passage.source_url {
                    println!("    source: {url}");
                }
                println!(
                    "    excerpt: \"{}\"",
                    passage.text.replace('\n', " ").chars().take(240).collect::<String>()
                );
                println!();
            }
            Ok(())
        }

        Commands::Info => {
            let service = LoreService::open(&config).await?;
            let info = service.collection_info().await?;
            println!("collection");
            println!("  entries: {}", info.count);
            println!(
                "  dimension: {}",
                info.dimension
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "(unset)".to_string())
            );
            println!(
                "  model: {}",
                info.model_id.unwrap_or_else(|| "(unset)".to_string())
            );
            println!("  corpus articles: {}", service.corpus_size().await?);
            Ok(())
        }
    }
}

fn print_report(label: &str, report: &IngestReport) {
    println!("{label}");
    println!("  articles seen: {}", report.articles_seen);
    println!("  indexed: {}", report.articles_indexed);
    println!("  skipped (unchanged or empty): {}", report.articles_skipped);
    println!("  chunks written: {}", report.chunks_written);
    println!("  failures: {}", report.failures.len());
    for failure in &report.failures {
        println!("    - {}: {}", failure.article_id, failure.reason);
    }
    println!("ok");
}
