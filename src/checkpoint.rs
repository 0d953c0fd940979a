//! SQLite checkpoint store for conversation threads.
//!
//! Every agent step appends one row; loading a thread returns the row with
//! the highest step. Rows are never updated in place. Only the newest
//! `retention` rows per thread are kept; older ones are pruned by the save
//! that pushes them out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use oracle_core::conversation::ConversationState;
use oracle_core::store::CheckpointSaver;

/// Snapshots kept per thread unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 20;

pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
    retention: i64,
}

impl SqliteCheckpointSaver {
    /// Wrap a pool already migrated with the relational schema.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            retention: DEFAULT_RETENTION as i64,
        }
    }

    pub fn with_retention(mut self, keep: usize) -> Self {
        self.retention = keep.max(1) as i64;
        self
    }

    /// Number of snapshots stored for a thread.
    pub async fn step_count(&self, thread_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn save(&self, state: &ConversationState) -> Result<i64> {
        let json = serde_json::to_string(state)?;
        let mut tx = self.pool.begin().await?;

        let last: Option<i64> =
            sqlx::query_scalar("SELECT MAX(step) FROM checkpoints WHERE thread_id = ?")
                .bind(&state.thread_id)
                .fetch_one(&mut *tx)
                .await?;
        let step = last.map(|s| s + 1).unwrap_or(0);

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, step, state_json, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&state.thread_id)
        .bind(step)
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let pruned = sqlx::query("DELETE FROM checkpoints WHERE thread_id = ? AND step <= ?")
            .bind(&state.thread_id)
            .bind(step - self.retention)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        if pruned > 0 {
            debug!(thread = %state.thread_id, pruned, "pruned old checkpoints");
        }
        Ok(step)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT state_json FROM checkpoints WHERE thread_id = ? ORDER BY step DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        json.map(|j| {
            serde_json::from_str(&j)
                .with_context(|| format!("Corrupt checkpoint for thread {}", thread_id))
        })
        .transpose()
    }
}
