//! Idempotent schema setup for the two SQLite files.
//!
//! The relational file holds the document catalog, the indexing journal and
//! conversation checkpoints. The vector file holds embedded chunks.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn migrate_relational(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS docs (
            id TEXT PRIMARY KEY,
            filepath TEXT,
            file_hash TEXT,
            chunk_count INT,
            last_indexed TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_docs_filepath ON docs(filepath)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_docs_file_hash ON docs(file_hash)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_journal (
            filepath TEXT PRIMARY KEY,
            file_hash TEXT NOT NULL,
            started_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id TEXT NOT NULL,
            step INTEGER NOT NULL,
            state_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (thread_id, step)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn migrate_vectors(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            indexed_at TEXT NOT NULL,
            content_type TEXT NOT NULL,
            language TEXT NOT NULL,
            start_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_source ON vectors(source)")
        .execute(pool)
        .await?;

    Ok(())
}
