//! Change-aware indexing against real SQLite stores.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use oracle_core::chunk::ChunkingPolicy;
use oracle_core::digest::content_digest;
use oracle_core::embedding::Embedder;
use oracle_core::models::ContentType;
use oracle_core::store::PendingIndex;
use oracle_core::CoreError;

use repo_oracle::document_store::{IndexOutcome, SourceFile};
use repo_oracle::error::OracleError;
use repo_oracle::progress::NoProgress;
use repo_oracle::registry::{StoreKey, StoreRegistry};

/// Letter-frequency vectors: deterministic, and similar texts score high.
struct LetterEmbedder {
    calls: AtomicUsize,
}

impl LetterEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0f32; 26];
                for c in t.chars().filter(|c| c.is_ascii_alphabetic()) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct Env {
    dir: TempDir,
    embedder: Arc<LetterEmbedder>,
    registry: StoreRegistry,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder::new());
        let registry = StoreRegistry::new(embedder.clone(), ChunkingPolicy::default());
        Self {
            dir,
            embedder,
            registry,
        }
    }

    fn key(&self) -> StoreKey {
        StoreKey::new(
            self.dir.path().join(".oracle/vectors.db"),
            self.dir.path().join(".oracle/database.db"),
        )
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn path_str(p: &Path) -> String {
    p.display().to_string()
}

#[tokio::test]
async fn test_reindexing_unchanged_file_is_noop() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("src/lib.rs", "pub fn hello() -> &'static str {\n    \"hello\"\n}\n");

    let first = store.add_documents(&file).await.unwrap();
    assert!(matches!(first, IndexOutcome::Indexed { chunks: 1 }));
    let calls = env.embedder.calls.load(Ordering::SeqCst);

    let second = store.add_documents(&file).await.unwrap();
    assert_eq!(second, IndexOutcome::Unchanged);
    assert_eq!(env.embedder.calls.load(Ordering::SeqCst), calls);

    let docs = store.list().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(
        store.vectors().count_for_source(&path_str(&file)).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_changed_file_replaces_vectors() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("notes.md", "first version of the notes");
    store.add_documents(&file).await.unwrap();
    let original = store.catalog().find(&path_str(&file)).await.unwrap().unwrap();

    let long: String = (0..200)
        .map(|i| format!("Paragraph {} talks about indexing.\n\n", i))
        .collect();
    std::fs::write(&file, &long).unwrap();
    let h2 = content_digest(long.as_bytes());

    let outcome = store.add_documents(&file).await.unwrap();
    let IndexOutcome::Indexed { chunks } = outcome else {
        panic!("expected re-index, got {:?}", outcome);
    };
    assert!(chunks > 1);

    let record = store.catalog().find(&path_str(&file)).await.unwrap().unwrap();
    assert_eq!(record.id, original.id);
    assert_eq!(record.content_hash, h2);
    assert_eq!(record.chunk_count as usize, chunks);

    let stored = store
        .vectors()
        .chunks_for_source(&path_str(&file))
        .await
        .unwrap();
    assert_eq!(stored.len(), chunks);
    assert!(stored.iter().all(|c| c.metadata.content_hash == h2));
}

#[tokio::test]
async fn test_chunk_metadata_is_complete() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("app.py", "def main():\n    print('hi')\n");
    store.add_documents(&file).await.unwrap();

    let chunks = store
        .vectors()
        .chunks_for_source(&path_str(&file))
        .await
        .unwrap();
    assert_eq!(chunks.len(), 1);
    let meta = &chunks[0].metadata;
    assert_eq!(meta.source, path_str(&file));
    assert_eq!(meta.content_type, ContentType::Code);
    assert_eq!(meta.language, "python");
    assert_eq!(meta.start_index, 0);
    assert_eq!(meta.content_hash, content_digest(b"def main():\n    print('hi')\n"));
    assert!(!meta.indexed_at.is_empty());
}

#[tokio::test]
async fn test_unsupported_file_rejected() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("logo.png", "not really a png");

    let err = store.add_documents(&file).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::UnsupportedFile(_))
    ));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_skips_unchanged_and_unsupported() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let a = env.write("a.rs", "fn a() {}");
    let b = env.write("b.md", "# b");
    let img = env.write("c.png", "binary");
    store.add_documents(&a).await.unwrap();

    let files = vec![SourceFile::at(&a), SourceFile::at(&b), SourceFile::at(&img)];
    let report = store.add_documents_batch(&files, &NoProgress).await.unwrap();

    assert_eq!(report.indexed, vec![path_str(&b)]);
    assert_eq!(report.unchanged, vec![path_str(&a)]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, path_str(&img));
    assert_eq!(store.list().await.unwrap().len(), 2);
    assert!(store.catalog().pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_staged_copy_tracked_under_origin() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let origin = env.write("src/main.rs", "fn main() {}");
    let staged = env.write(".oracle/staging/main.rs", "fn main() {}");

    let report = store
        .add_documents_batch(&[SourceFile::staged(path_str(&origin), &staged)], &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.indexed, vec![path_str(&origin)]);

    let hashes = store.get_current_hashes(&[path_str(&origin)]).await.unwrap();
    assert_eq!(hashes[&path_str(&origin)], content_digest(b"fn main() {}"));
}

#[tokio::test]
async fn test_current_hashes_requires_existing_paths() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("ok.txt", "present");
    store.add_documents(&file).await.unwrap();

    let ghost = path_str(&env.dir.path().join("ghost.txt"));
    let err = store
        .get_current_hashes(&[path_str(&file), ghost.clone()])
        .await
        .unwrap_err();
    match err.downcast_ref::<OracleError>() {
        Some(OracleError::MissingPaths(paths)) => assert_eq!(paths, &vec![ghost]),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_remove_doc_keeps_catalog_record() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("gone.md", "soon without vectors");
    store.add_documents(&file).await.unwrap();

    assert_eq!(store.remove_doc(&path_str(&file)).await.unwrap(), 1);
    assert_eq!(
        store.vectors().count_for_source(&path_str(&file)).await.unwrap(),
        0
    );
    assert!(store.catalog().find(&path_str(&file)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_similarity_search_ranks_closest_first() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let zebra = env.write("zebra.txt", "zzz zebra zone");
    let apple = env.write("apple.txt", "apple pie and applesauce");
    store.add_documents(&zebra).await.unwrap();
    store.add_documents(&apple).await.unwrap();

    let results = store.similarity_search("apple apple", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.metadata.source, path_str(&apple));
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn test_registry_returns_same_instance() {
    let env = Env::new();
    let first = env.registry.open(&env.key()).await.unwrap();
    let second = env.registry.open(&env.key()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(env.registry.is_open(&env.key()).await);

    let other = StoreKey::new(
        env.dir.path().join("other/vectors.db"),
        env.dir.path().join(".oracle/database.db"),
    );
    let third = env.registry.open(&other).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));

    env.registry.close_all().await;
    assert!(!env.registry.is_open(&env.key()).await);
}

#[tokio::test]
async fn test_interrupted_indexing_is_reconciled_on_open() {
    let env = Env::new();
    let file = env.write("half.md", "written before the crash");
    let filepath = path_str(&file);

    {
        let store = env.registry.open(&env.key()).await.unwrap();
        store.add_documents(&file).await.unwrap();
        store
            .catalog()
            .mark_pending(&[PendingIndex {
                filepath: filepath.clone(),
                content_hash: "h2".to_string(),
                started_at: "2026-01-01T00:00:00Z".to_string(),
            }])
            .await
            .unwrap();
    }
    env.registry.close_all().await;

    let registry = StoreRegistry::new(env.embedder.clone(), ChunkingPolicy::default());
    let store = registry.open(&env.key()).await.unwrap();
    assert!(store.catalog().find(&filepath).await.unwrap().is_none());
    assert_eq!(store.vectors().count_for_source(&filepath).await.unwrap(), 0);
    assert!(store.catalog().pending().await.unwrap().is_empty());

    // The next commit indexes it again.
    assert!(matches!(
        store.add_documents(&file).await.unwrap(),
        IndexOutcome::Indexed { .. }
    ));
}

#[tokio::test]
async fn test_read_only_pool_sees_catalog_but_refuses_writes() {
    let env = Env::new();
    let store = env.registry.open(&env.key()).await.unwrap();
    let file = env.write("src/commands/delete.rs", "fn delete() {}");
    store.add_documents(&file).await.unwrap();

    let pool = env.registry.read_only_pool(&env.key().relational).await.unwrap();
    let hash: String = sqlx::query_scalar("SELECT file_hash FROM docs WHERE filepath = ?")
        .bind(path_str(&file))
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(hash, content_digest(b"fn delete() {}"));
    assert!(sqlx::query("DELETE FROM docs").execute(&pool).await.is_err());
    assert_eq!(store.list().await.unwrap().len(), 1);
}
