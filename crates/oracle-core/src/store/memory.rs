//! In-memory store implementations.
//!
//! Plain collections behind `std::sync::RwLock`. Vector search is
//! brute-force cosine over every stored chunk.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::conversation::ConversationState;
use crate::embedding::cosine_similarity;
use crate::models::{ChunkRecord, DocumentRecord, EmbeddedChunk, ScoredChunk};

use super::{Catalog, CheckpointSaver, PendingIndex, VectorIndex};

#[derive(Default)]
pub struct MemoryCatalog {
    records: RwLock<BTreeMap<String, DocumentRecord>>,
    journal: RwLock<BTreeMap<String, PendingIndex>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find(&self, filepath: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.records.read().unwrap().get(filepath).cloned())
    }

    async fn hashes_for(&self, filepaths: &[String]) -> Result<HashMap<String, String>> {
        let records = self.records.read().unwrap();
        Ok(filepaths
            .iter()
            .filter_map(|p| records.get(p).map(|r| (p.clone(), r.content_hash.clone())))
            .collect())
    }

    async fn upsert(&self, incoming: &[DocumentRecord]) -> Result<()> {
        let mut records = self.records.write().unwrap();
        for rec in incoming {
            let id = records
                .get(&rec.filepath)
                .map(|existing| existing.id.clone())
                .unwrap_or_else(|| rec.id.clone());
            records.insert(
                rec.filepath.clone(),
                DocumentRecord {
                    id,
                    ..rec.clone()
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, filepath: &str) -> Result<bool> {
        Ok(self.records.write().unwrap().remove(filepath).is_some())
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    async fn mark_pending(&self, entries: &[PendingIndex]) -> Result<()> {
        let mut journal = self.journal.write().unwrap();
        for e in entries {
            journal.insert(e.filepath.clone(), e.clone());
        }
        Ok(())
    }

    async fn clear_pending(&self, filepaths: &[String]) -> Result<()> {
        let mut journal = self.journal.write().unwrap();
        for p in filepaths {
            journal.remove(p);
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PendingIndex>> {
        Ok(self.journal.read().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryVectorIndex {
    chunks: RwLock<Vec<EmbeddedChunk>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn insert(&self, incoming: &[EmbeddedChunk]) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        for c in incoming {
            chunks.retain(|existing| existing.chunk.id != c.chunk.id);
            chunks.push(c.clone());
        }
        Ok(())
    }

    async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let mut chunks = self.chunks.write().unwrap();
        let before = chunks.len();
        chunks.retain(|c| c.chunk.metadata.source != source);
        Ok((before - chunks.len()) as u64)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let chunks = self.chunks.read().unwrap();
        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .map(|c| ScoredChunk {
                chunk: c.chunk.clone(),
                score: cosine_similarity(query, &c.embedding) as f64,
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
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .iter()
            .filter(|c| c.chunk.metadata.source == source)
            .count() as u64)
    }

    async fn chunks_for_source(&self, source: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = self.chunks.read().unwrap();
        let mut out: Vec<ChunkRecord> = chunks
            .iter()
            .filter(|c| c.chunk.metadata.source == source)
            .map(|c| c.chunk.clone())
            .collect();
        out.sort_by_key(|c| c.metadata.start_index);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryCheckpointSaver {
    threads: RwLock<HashMap<String, Vec<ConversationState>>>,
}

impl MemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots written for a thread.
    pub fn steps(&self, thread_id: &str) -> usize {
        self.threads
            .read()
            .unwrap()
            .get(thread_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CheckpointSaver for MemoryCheckpointSaver {
    async fn save(&self, state: &ConversationState) -> Result<i64> {
        let mut threads = self.threads.write().unwrap();
        let history = threads.entry(state.thread_id.clone()).or_default();
        history.push(state.clone());
        Ok(history.len() as i64 - 1)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        Ok(self
            .threads
            .read()
            .unwrap()
            .get(thread_id)
            .and_then(|h| h.last().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::models::{ChunkMetadata, ContentType};

    fn record(path: &str, hash: &str) -> DocumentRecord {
        DocumentRecord {
            id: format!("id-{}-{}", path, hash),
            filepath: path.into(),
            content_hash: hash.into(),
            chunk_count: 1,
            last_indexed: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn embedded(id: &str, source: &str, v: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: ChunkRecord {
                id: id.into(),
                text: format!("text {}", id),
                metadata: ChunkMetadata {
                    source: source.into(),
                    content_hash: "h".into(),
                    indexed_at: "t".into(),
                    content_type: ContentType::Text,
                    language: "text".into(),
                    start_index: 0,
                },
            },
            embedding: v,
        }
    }

    #[tokio::test]
    async fn test_catalog_upsert_keeps_id() {
        let cat = MemoryCatalog::new();
        cat.upsert(&[record("a.md", "h1")]).await.unwrap();
        cat.upsert(&[record("a.md", "h2")]).await.unwrap();

        let all = cat.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content_hash, "h2");
        assert_eq!(all[0].id, "id-a.md-h1");

        let hashes = cat
            .hashes_for(&["a.md".into(), "missing.md".into()])
            .await
            .unwrap();
        assert_eq!(hashes.len(), 1);
        assert!(cat.delete("a.md").await.unwrap());
        assert!(!cat.delete("a.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_journal() {
        let cat = MemoryCatalog::new();
        let marker = PendingIndex {
            filepath: "a.md".into(),
            content_hash: "h".into(),
            started_at: "t".into(),
        };
        cat.mark_pending(&[marker.clone()]).await.unwrap();
        assert_eq!(cat.pending().await.unwrap(), vec![marker]);
        cat.clear_pending(&["a.md".into()]).await.unwrap();
        assert!(cat.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vector_search_and_delete() {
        let idx = MemoryVectorIndex::new();
        idx.insert(&[
            embedded("1", "a.md", vec![1.0, 0.0]),
            embedded("2", "a.md", vec![0.0, 1.0]),
            embedded("3", "b.md", vec![0.7, 0.7]),
        ])
        .await
        .unwrap();

        let hits = idx.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "1");
        assert_eq!(hits[1].chunk.id, "3");

        assert_eq!(idx.delete_by_source("a.md").await.unwrap(), 2);
        assert_eq!(idx.count_for_source("a.md").await.unwrap(), 0);
        assert_eq!(idx.count_for_source("b.md").await.unwrap(), 1);
        assert_eq!(idx.len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoints_latest_wins() {
        let saver = MemoryCheckpointSaver::new();
        let mut state = ConversationState::new("t");
        assert_eq!(saver.save(&state).await.unwrap(), 0);
        state.messages.push(Message::user("hi"));
        assert_eq!(saver.save(&state).await.unwrap(), 1);

        let loaded = saver.load("t").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert!(saver.load("other").await.unwrap().is_none());
        assert_eq!(saver.steps("t"), 2);
    }
}
