//! Storage abstractions for repo-oracle.
//!
//! Three traits split persistence the way the system splits it on disk:
//!
//! | Trait | Holds | Keyed by |
//! |-------|-------|----------|
//! | [`Catalog`] | one [`DocumentRecord`] per file, plus write-ahead markers | filepath |
//! | [`VectorIndex`] | embedded chunks | chunk id, deleted by `source` |
//! | [`CheckpointSaver`] | [`ConversationState`] snapshots | thread id + step |
//!
//! The SQLite implementations live in the application crate; [`memory`]
//! provides lock-guarded in-process versions for tests.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationState;
use crate::models::{ChunkRecord, DocumentRecord, EmbeddedChunk, ScoredChunk};

/// A write-ahead marker: indexing of `filepath` at `content_hash` began but
/// has not been confirmed complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIndex {
    pub filepath: String,
    pub content_hash: String,
    pub started_at: String,
}

/// Relational catalog of indexed files.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find(&self, filepath: &str) -> Result<Option<DocumentRecord>>;

    /// Stored digests for the given paths. Paths without a record are absent
    /// from the result.
    async fn hashes_for(&self, filepaths: &[String]) -> Result<HashMap<String, String>>;

    /// Insert or update records by filepath, all or nothing.
    ///
    /// An existing record keeps its id; hash, chunk count and timestamp are
    /// replaced together.
    async fn upsert(&self, records: &[DocumentRecord]) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, filepath: &str) -> Result<bool>;

    /// All records ordered by filepath.
    async fn list(&self) -> Result<Vec<DocumentRecord>>;

    async fn mark_pending(&self, entries: &[PendingIndex]) -> Result<()>;

    async fn clear_pending(&self, filepaths: &[String]) -> Result<()>;

    async fn pending(&self) -> Result<Vec<PendingIndex>>;
}

/// Similarity index over embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn insert(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Delete every chunk whose `source` exactly equals `source`. Returns
    /// the number removed.
    async fn delete_by_source(&self, source: &str) -> Result<u64>;

    /// Top `k` chunks by cosine similarity, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    async fn count_for_source(&self, source: &str) -> Result<u64>;

    /// Chunks for one source ordered by `start_index`.
    async fn chunks_for_source(&self, source: &str) -> Result<Vec<ChunkRecord>>;
}

/// Persistence for conversation threads.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a snapshot and return its step number.
    async fn save(&self, state: &ConversationState) -> Result<i64>;

    /// Latest snapshot for the thread.
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>>;
}
