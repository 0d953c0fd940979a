//! SQLite-backed vector index.
//!
//! Chunks and their embeddings share one `vectors` table; similarity search
//! loads every embedding and ranks by cosine in process, which is plenty for
//! a single repository.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use oracle_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use oracle_core::models::{ChunkMetadata, ChunkRecord, ContentType, EmbeddedChunk, ScoredChunk};
use oracle_core::store::VectorIndex;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn chunk_from_row(row: &SqliteRow) -> ChunkRecord {
    let content_type: String = row.get("content_type");
    ChunkRecord {
        id: row.get("id"),
        text: row.get("text"),
        metadata: ChunkMetadata {
            source: row.get("source"),
            content_hash: row.get("file_hash"),
            indexed_at: row.get("indexed_at"),
            content_type: ContentType::parse(&content_type).unwrap_or(ContentType::Text),
            language: row.get("language"),
            start_index: row.get::<i64, _>("start_index").max(0) as usize,
        },
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for c in chunks {
            let meta = &c.chunk.metadata;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO vectors
                    (id, source, file_hash, indexed_at, content_type, language, start_index, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.chunk.id)
            .bind(&meta.source)
            .bind(&meta.content_hash)
            .bind(&meta.indexed_at)
            .bind(meta.content_type.as_str())
            .bind(&meta.language)
            .bind(meta.start_index as i64)
            .bind(&c.chunk.text)
            .bind(vec_to_blob(&c.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vectors WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, source, file_hash, indexed_at, content_type, language, start_index, text, embedding FROM vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredChunk {
                    score: cosine_similarity(query, &blob_to_vec(&blob)) as f64,
                    chunk: chunk_from_row(row),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count_for_source(&self, source: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn chunks_for_source(&self, source: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, source, file_hash, indexed_at, content_type, language, start_index, text \
             FROM vectors WHERE source = ? ORDER BY start_index",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }
}
