//! Read-only access to the article corpus database.
//!
//! The corpus is a SQLite file with an `articles` table
//! (`id, final_title, content, article_url`). It is the source of truth for
//! article text and is never written by this crate; the connection is
//! opened read-only to enforce that.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::models::Article;

pub struct ArticleStore {
    pool: SqlitePool,
}

fn corpus_err(e: sqlx::Error) -> Error {
    Error::Corpus(e.to_string())
}

impl ArticleStore {
    /// Open the corpus database read-only. Fails if the file is missing.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(corpus_err)?
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::Corpus(format!("cannot open corpus at {}: {e}", path.display()))
            })?;

        Ok(Self { pool })
    }

    pub async fn list_articles(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query("SELECT id, final_title, content, article_url FROM articles")
            .fetch_all(&self.pool)
            .await
            .map_err(corpus_err)?;

        Ok(rows.iter().map(row_to_article).collect())
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let row =
            sqlx::query("SELECT id, final_title, content, article_url FROM articles WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(corpus_err)?;

        Ok(row.as_ref().map(row_to_article))
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(corpus_err)?;
        Ok(count as u64)
    }
}

fn row_to_article(row: &sqlx::sqlite::SqliteRow) -> Article {
    Article {
        id: row.get("id"),
        title: row.get("final_title"),
        body: row.get("content"),
        source_url: row.get("article_url"),
    }
}
