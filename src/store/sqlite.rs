//! Durable SQLite-backed vector index.
//!
//! Lives in a single database file inside the index directory. Embeddings
//! are stored as little-endian f32 BLOBs; similarity is computed in-process
//! over all rows (the corpus is a bounded article set, not web scale).
//! WAL journal mode lets retrieval read concurrently with ingestion
//! writes, and per-article transactions keep replacement atomic, so
//! readers see an article's chunks either entirely old or entirely new.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::models::{CollectionInfo, IndexEntry, RetrievedPassage};

use super::{blob_to_vec, cosine_similarity, rank, vec_to_blob, VectorStore};

const INDEX_FILE: &str = "index.sqlite";

pub struct SqliteStore {
    pool: SqlitePool,
}

fn store_err(e: sqlx::Error) -> Error {
    Error::StoreUnavailable(e.to_string())
}

impl SqliteStore {
    /// Open (or create) the index under `index_dir` and run migrations.
    pub async fn open(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(|e| {
            Error::StoreUnavailable(format!(
                "cannot create index directory {}: {e}",
                index_dir.display()
            ))
        })?;

        let path = index_dir.join(INDEX_FILE);
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(store_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                dimension INTEGER NOT NULL,
                model_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                chunk_id TEXT PRIMARY KEY,
                article_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                source_url TEXT,
                text TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_article_id ON entries(article_id)")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_content_hash ON entries(content_hash)")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn meta(&self) -> Result<Option<(usize, String)>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT dimension, model_id FROM collection_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(row.map(|(d, m)| (d as usize, m)))
    }
}

/// Validate an entry against the pinned `(dimension, model_id)`, pinning it
/// on first use. Runs inside the caller's transaction so a later failure
/// rolls the pin back too.
async fn ensure_meta(
    conn: &mut sqlx::SqliteConnection,
    dims: usize,
    model_id: &str,
) -> Result<()> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT dimension, model_id FROM collection_meta WHERE id = 1")
            .fetch_optional(&mut *conn)
            .await
            .map_err(store_err)?;

    match row {
        Some((d, m)) => {
            if d as usize != dims {
                return Err(Error::DimensionMismatch {
                    got: dims,
                    expected: d as usize,
                });
            }
            if m != model_id {
                return Err(Error::ModelMismatch {
                    stored: m,
                    requested: model_id.to_string(),
                });
            }
        }
        None => {
            sqlx::query("INSERT INTO collection_meta (id, dimension, model_id) VALUES (1, ?, ?)")
                .bind(dims as i64)
                .bind(model_id)
                .execute(&mut *conn)
                .await
                .map_err(store_err)?;
        }
    }
    Ok(())
}

async fn insert_entry(conn: &mut sqlx::SqliteConnection, entry: &IndexEntry) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO entries
            (chunk_id, article_id, title, source_url, text, start_offset, end_offset, content_hash, embedding, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            article_id = excluded.article_id,
            title = excluded.title,
            source_url = excluded.source_url,
            text = excluded.text,
            start_offset = excluded.start_offset,
            end_offset = excluded.end_offset,
            content_hash = excluded.content_hash,
            embedding = excluded.embedding,
            created_at = excluded.created_at
        "#,
    )
    .bind(&entry.chunk.id)
    .bind(entry.chunk.article_id)
    .bind(&entry.title)
    .bind(&entry.source_url)
    .bind(&entry.chunk.text)
    .bind(entry.chunk.start_offset as i64)
    .bind(entry.chunk.end_offset as i64)
    .bind(&entry.chunk.content_hash)
    .bind(vec_to_blob(&entry.embedding.vector))
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(store_err)?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        ensure_meta(
            &mut *tx,
            entry.embedding.vector.len(),
            &entry.embedding.model_id,
        )
        .await?;
        insert_entry(&mut *tx, entry).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, chunk_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM entries WHERE chunk_id = ?")
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn replace_article(&self, article_id: i64, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("DELETE FROM entries WHERE article_id = ?")
            .bind(article_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        for entry in entries {
            ensure_meta(
                &mut *tx,
                entry.embedding.vector.len(),
                &entry.embedding.model_id,
            )
            .await?;
            insert_entry(&mut *tx, entry).await?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        match self.meta().await? {
            None => return Ok(Vec::new()),
            Some((dims, _)) => {
                if vector.len() != dims {
                    return Err(Error::DimensionMismatch {
                        got: vector.len(),
                        expected: dims,
                    });
                }
            }
        }

        let rows = sqlx::query(
            "SELECT chunk_id, article_id, title, source_url, text, embedding FROM entries",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let candidates: Vec<RetrievedPassage> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                RetrievedPassage {
                    chunk_id: row.get("chunk_id"),
                    article_id: row.get("article_id"),
                    title: row.get("title"),
                    source_url: row.get("source_url"),
                    text: row.get("text"),
                    score: cosine_similarity(vector, &stored),
                }
            })
            .collect();

        Ok(rank(candidates, k))
    }

    async fn article_hashes(&self, article_id: i64) -> Result<HashSet<String>> {
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT content_hash FROM entries WHERE article_id = ?")
                .bind(article_id)
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(hashes.into_iter().collect())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let meta = self.meta().await?;
        Ok(CollectionInfo {
            count: count as u64,
            dimension: meta.as_ref().map(|(d, _)| *d),
            model_id: meta.map(|(_, m)| m),
        })
    }
}
