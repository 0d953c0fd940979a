//! SQLite document catalog.
//!
//! One row per indexed file in `docs`, plus the `index_journal` write-ahead
//! markers used to reconcile interrupted indexing.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use oracle_core::models::DocumentRecord;
use oracle_core::store::{Catalog, PendingIndex};

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Wrap an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        filepath: row.get::<Option<String>, _>("filepath").unwrap_or_default(),
        content_hash: row.get::<Option<String>, _>("file_hash").unwrap_or_default(),
        chunk_count: row.get::<Option<i64>, _>("chunk_count").unwrap_or(0),
        last_indexed: row
            .get::<Option<String>, _>("last_indexed")
            .unwrap_or_default(),
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn find(&self, filepath: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, filepath, file_hash, chunk_count, last_indexed FROM docs WHERE filepath = ?",
        )
        .bind(filepath)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn hashes_for(&self, filepaths: &[String]) -> Result<HashMap<String, String>> {
        let mut hashes = HashMap::with_capacity(filepaths.len());
        for path in filepaths {
            let hash: Option<Option<String>> =
                sqlx::query_scalar("SELECT file_hash FROM docs WHERE filepath = ?")
                    .bind(path)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(Some(hash)) = hash {
                hashes.insert(path.clone(), hash);
            }
        }
        Ok(hashes)
    }

    async fn upsert(&self, records: &[DocumentRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for rec in records {
            let updated = sqlx::query(
                "UPDATE docs SET file_hash = ?, chunk_count = ?, last_indexed = ? WHERE filepath = ?",
            )
            .bind(&rec.content_hash)
            .bind(rec.chunk_count)
            .bind(&rec.last_indexed)
            .bind(&rec.filepath)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    "INSERT INTO docs (id, filepath, file_hash, chunk_count, last_indexed) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&rec.id)
                .bind(&rec.filepath)
                .bind(&rec.content_hash)
                .bind(rec.chunk_count)
                .bind(&rec.last_indexed)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, filepath: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM docs WHERE filepath = ?")
            .bind(filepath)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, filepath, file_hash, chunk_count, last_indexed FROM docs ORDER BY filepath",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn mark_pending(&self, entries: &[PendingIndex]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for e in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO index_journal (filepath, file_hash, started_at) VALUES (?, ?, ?)",
            )
            .bind(&e.filepath)
            .bind(&e.content_hash)
            .bind(&e.started_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_pending(&self, filepaths: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for path in filepaths {
            sqlx::query("DELETE FROM index_journal WHERE filepath = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PendingIndex>> {
        let rows = sqlx::query(
            "SELECT filepath, file_hash, started_at FROM index_journal ORDER BY started_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| PendingIndex {
                filepath: row.get("filepath"),
                content_hash: row.get("file_hash"),
                started_at: row.get("started_at"),
            })
            .collect())
    }
}
