//! Change-aware indexing into the catalog and the vector index.
//!
//! Every file is identified by its filepath string and fingerprinted by a
//! SHA-256 digest of its raw bytes. A file is (re)indexed only when
//! [`DocumentStore::validate`] says its digest is new; otherwise the call is
//! a no-op.
//!
//! # Write protocol
//!
//! Reading, chunking and embedding all happen before either store is
//! touched. Mutation then runs in this order:
//!
//! 1. write a journal marker `(filepath, digest)` into the catalog
//! 2. delete every vector whose `source` equals the filepath
//! 3. upsert the catalog record (digest, chunk count, timestamp)
//! 4. insert the new vectors
//! 5. clear the marker
//!
//! A crash between 1 and 5 leaves the marker behind. [`DocumentStore::reconcile`]
//! (run when the registry first opens a store) drops that path's vectors
//! and record, so the next commit re-indexes it from scratch. Indexing is
//! therefore at-least-once, and a path never exposes chunks from two
//! different digests after a restart.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use oracle_core::chunk::{classify, ChunkingPolicy};
use oracle_core::digest::content_digest;
use oracle_core::embedding::Embedder;
use oracle_core::models::{ChunkRecord, DocumentRecord, EmbeddedChunk, ScoredChunk};
use oracle_core::store::{Catalog, PendingIndex, VectorIndex};

use crate::error::OracleError;
use crate::progress::{IndexProgressEvent, IndexProgressReporter};

/// A file to index: the key it is tracked under and where to read it.
///
/// Staged copies are read from the staging area but tracked under the path
/// they were staged from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub filepath: String,
    pub location: PathBuf,
}

impl SourceFile {
    /// A file tracked under its own path.
    pub fn at(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            filepath: path.display().to_string(),
            location: path.to_path_buf(),
        }
    }

    pub fn staged(filepath: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed { chunks: usize },
    Unchanged,
}

/// Per-file results of [`DocumentStore::add_documents_batch`].
#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    pub indexed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Filepath and the reason it was skipped.
    pub skipped: Vec<(String, String)>,
    pub chunks_written: usize,
}

struct PreparedFile {
    record: DocumentRecord,
    chunks: Vec<EmbeddedChunk>,
}

pub struct DocumentStore {
    catalog: Arc<dyn Catalog>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingPolicy,
    embed_batch_size: usize,
}

impl DocumentStore {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingPolicy,
    ) -> Self {
        Self {
            catalog,
            vectors,
            embedder,
            chunking,
            embed_batch_size: 64,
        }
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    /// True iff `filepath` has no record or its stored digest differs.
    pub async fn validate(&self, filepath: &str, digest: &str) -> Result<bool> {
        Ok(match self.catalog.find(filepath).await? {
            None => true,
            Some(rec) => rec.content_hash != digest,
        })
    }

    /// Index a single file tracked under its own path.
    ///
    /// Unsupported file types are rejected with
    /// [`CoreError::UnsupportedFile`](oracle_core::CoreError::UnsupportedFile).
    pub async fn add_documents(&self, path: &Path) -> Result<IndexOutcome> {
        self.add_source(&SourceFile::at(path)).await
    }

    pub async fn add_source(&self, file: &SourceFile) -> Result<IndexOutcome> {
        let Some(prepared) = self.prepare(file).await? else {
            debug!(path = %file.filepath, "unchanged, skipping");
            return Ok(IndexOutcome::Unchanged);
        };
        let chunk_count = prepared.chunks.len();
        let filepath = prepared.record.filepath.clone();

        self.catalog
            .mark_pending(&[pending_marker(&prepared.record)])
            .await?;
        let removed = self.vectors.delete_by_source(&filepath).await?;
        self.catalog
            .upsert(std::slice::from_ref(&prepared.record))
            .await?;
        self.vectors.insert(&prepared.chunks).await?;
        self.catalog.clear_pending(&[filepath.clone()]).await?;

        info!(path = %filepath, chunks = chunk_count, replaced = removed, "indexed");
        Ok(IndexOutcome::Indexed {
            chunks: chunk_count,
        })
    }

    /// Index many files with one vector insert and one catalog commit.
    ///
    /// Unchanged files are skipped. Unsupported and unreadable files are
    /// reported in [`BatchReport::skipped`] rather than failing the batch.
    /// Provider errors abort the batch before anything is written.
    pub async fn add_documents_batch(
        &self,
        files: &[SourceFile],
        progress: &dyn IndexProgressReporter,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut prepared: Vec<PreparedFile> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let total = files.len() as u64;

        for (i, file) in files.iter().enumerate() {
            progress.report(IndexProgressEvent::Preparing {
                n: i as u64,
                total,
            });

            if !seen.insert(file.filepath.as_str()) {
                warn!(path = %file.filepath, "listed twice in one batch, keeping the first");
                continue;
            }
            if let Err(e) = classify(Path::new(&file.filepath)) {
                warn!(path = %file.filepath, "skipping: {}", e);
                report.skipped.push((file.filepath.clone(), e.to_string()));
                continue;
            }
            if !file.location.is_file() {
                warn!(path = %file.location.display(), "skipping: not a readable file");
                report
                    .skipped
                    .push((file.filepath.clone(), "file not found".to_string()));
                continue;
            }

            match self.prepare(file).await? {
                Some(p) => prepared.push(p),
                None => report.unchanged.push(file.filepath.clone()),
            }
        }
        progress.report(IndexProgressEvent::Preparing { n: total, total });

        if prepared.is_empty() {
            return Ok(report);
        }

        let chunk_total: usize = prepared.iter().map(|p| p.chunks.len()).sum();
        progress.report(IndexProgressEvent::Writing {
            files: prepared.len() as u64,
            chunks: chunk_total as u64,
        });

        let markers: Vec<PendingIndex> = prepared.iter().map(|p| pending_marker(&p.record)).collect();
        self.catalog.mark_pending(&markers).await?;

        for p in &prepared {
            self.vectors.delete_by_source(&p.record.filepath).await?;
        }

        let mut records = Vec::with_capacity(prepared.len());
        let mut all_chunks = Vec::with_capacity(chunk_total);
        for p in prepared {
            records.push(p.record);
            all_chunks.extend(p.chunks);
        }

        self.vectors.insert(&all_chunks).await?;
        self.catalog.upsert(&records).await?;

        let paths: Vec<String> = records.iter().map(|r| r.filepath.clone()).collect();
        self.catalog.clear_pending(&paths).await?;

        info!(
            files = records.len(),
            chunks = chunk_total,
            "batch indexed"
        );
        report.indexed = paths;
        report.chunks_written = chunk_total;
        Ok(report)
    }

    /// Read, digest, gate, chunk and embed one file. `None` if unchanged.
    async fn prepare(&self, file: &SourceFile) -> Result<Option<PreparedFile>> {
        let bytes = std::fs::read(&file.location)
            .with_context(|| format!("Failed to read {}", file.location.display()))?;
        let digest = content_digest(&bytes);

        if !self.validate(&file.filepath, &digest).await? {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&bytes);
        let indexed_at = chrono::Utc::now().to_rfc3339();
        let chunks = self
            .chunking
            .chunk(&file.filepath, &text, &digest, &indexed_at)?;
        let embedded = self.embed_chunks(chunks).await?;

        let id = match self.catalog.find(&file.filepath).await? {
            Some(existing) => existing.id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        Ok(Some(PreparedFile {
            record: DocumentRecord {
                id,
                filepath: file.filepath.clone(),
                content_hash: digest,
                chunk_count: embedded.len() as i64,
                last_indexed: indexed_at,
            },
            chunks: embedded,
        }))
    }

    async fn embed_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<Vec<EmbeddedChunk>> {
        let mut out = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .with_context(|| format!("Embedding failed ({})", self.embedder.model_name()))?;
            if vectors.len() != batch.len() {
                anyhow::bail!(
                    "Embedding provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                );
            }
            out.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding }),
            );
        }
        Ok(out)
    }

    /// Stored digests for `filepaths`, all of which must exist on disk.
    pub async fn get_current_hashes(&self, filepaths: &[String]) -> Result<HashMap<String, String>> {
        let missing: Vec<String> = filepaths
            .iter()
            .filter(|p| !Path::new(p.as_str()).exists())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(OracleError::MissingPaths(missing).into());
        }
        self.catalog.hashes_for(filepaths).await
    }

    /// Delete every vector for `filepath`. The catalog record is kept.
    pub async fn remove_doc(&self, filepath: &str) -> Result<u64> {
        let removed = self.vectors.delete_by_source(filepath).await?;
        debug!(path = %filepath, removed, "removed vectors");
        Ok(removed)
    }

    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;
        self.vectors.search(&vector, k).await
    }

    pub async fn list(&self) -> Result<Vec<DocumentRecord>> {
        self.catalog.list().await
    }

    /// Undo half-finished indexing left behind by a crash. Returns the
    /// number of paths reset.
    pub async fn reconcile(&self) -> Result<usize> {
        let pending = self.catalog.pending().await?;
        for marker in &pending {
            warn!(
                path = %marker.filepath,
                started_at = %marker.started_at,
                "interrupted indexing found, resetting path"
            );
            self.vectors.delete_by_source(&marker.filepath).await?;
            self.catalog.delete(&marker.filepath).await?;
        }
        if !pending.is_empty() {
            let paths: Vec<String> = pending.into_iter().map(|m| m.filepath).collect();
            self.catalog.clear_pending(&paths).await?;
            return Ok(paths.len());
        }
        Ok(0)
    }
}

fn pending_marker(record: &DocumentRecord) -> PendingIndex {
    PendingIndex {
        filepath: record.filepath.clone(),
        content_hash: record.content_hash.clone(),
        started_at: record.last_indexed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oracle_core::store::memory::{MemoryCatalog, MemoryVectorIndex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Vector of (length, vowels, digits); fails on texts containing "boom".
    #[derive(Default)]
    struct TinyEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for TinyEmbedder {
        fn model_name(&self) -> &str {
            "tiny"
        }

        fn dims(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|t| {
                    if t.contains("boom") {
                        anyhow::bail!("provider down");
                    }
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    let digits = t.chars().filter(char::is_ascii_digit).count();
                    Ok(vec![t.len() as f32, vowels as f32, digits as f32])
                })
                .collect()
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        catalog: Arc<MemoryCatalog>,
        vectors: Arc<MemoryVectorIndex>,
        embedder: Arc<TinyEmbedder>,
        store: DocumentStore,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let vectors = Arc::new(MemoryVectorIndex::new());
        let embedder = Arc::new(TinyEmbedder::default());
        let store = DocumentStore::new(
            catalog.clone(),
            vectors.clone(),
            embedder.clone(),
            ChunkingPolicy::default(),
        );
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            catalog,
            vectors,
            embedder,
            store,
        }
    }

    impl Fixture {
        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        }
    }

    #[tokio::test]
    async fn test_unchanged_file_is_not_reembedded() {
        let f = fixture();
        let file = f.write("lib.rs", "pub fn one() -> u8 { 1 }");

        assert_eq!(
            f.store.add_documents(&file).await.unwrap(),
            IndexOutcome::Indexed { chunks: 1 }
        );
        assert_eq!(
            f.store.add_documents(&file).await.unwrap(),
            IndexOutcome::Unchanged
        );
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.vectors.len(), 1);
        assert_eq!(f.catalog.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_replaces_chunks_under_same_id() {
        let f = fixture();
        let file = f.write("notes.md", "draft");
        f.store.add_documents(&file).await.unwrap();
        let before = f.catalog.find(&file.display().to_string()).await.unwrap().unwrap();

        std::fs::write(&file, "final").unwrap();
        f.store.add_documents(&file).await.unwrap();

        let after = f.catalog.find(&file.display().to_string()).await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.content_hash, content_digest(b"final"));
        assert_eq!(f.vectors.len(), 1);
        let chunks = f.vectors.chunks_for_source(&after.filepath).await.unwrap();
        assert_eq!(chunks[0].text, "final");
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let f = fixture();
        let file = f.write("bad.txt", "boom");
        assert!(f.store.add_documents(&file).await.is_err());
        assert!(f.vectors.is_empty());
        assert!(f.catalog.list().await.unwrap().is_empty());
        assert!(f.catalog.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_resets_pending_paths() {
        let f = fixture();
        let file = f.write("half.txt", "indexed once");
        f.store.add_documents(&file).await.unwrap();
        let filepath = file.display().to_string();

        f.catalog
            .mark_pending(&[PendingIndex {
                filepath: filepath.clone(),
                content_hash: "next".into(),
                started_at: "2026-01-01T00:00:00Z".into(),
            }])
            .await
            .unwrap();

        assert_eq!(f.store.reconcile().await.unwrap(), 1);
        assert!(f.catalog.find(&filepath).await.unwrap().is_none());
        assert!(f.vectors.is_empty());
        assert_eq!(f.store.reconcile().await.unwrap(), 0);
        assert!(f.store.validate(&filepath, &content_digest(b"indexed once")).await.unwrap());
    }
}
