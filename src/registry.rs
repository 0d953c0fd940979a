//! Process-wide registry of open stores.
//!
//! A [`DocumentStore`] is constructed at most once per distinct
//! (vector location, relational location) pair; later requests for the same
//! pair get the same `Arc`. SQLite pools are shared per physical file, so
//! the checkpoint store and the document catalog use one handle when they
//! live in the same relational file.
//!
//! The registry is an explicit object passed by reference. Stores open on
//! first request and close on [`StoreRegistry::close_all`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info};

use oracle_core::chunk::ChunkingPolicy;
use oracle_core::embedding::Embedder;

use crate::catalog::SqliteCatalog;
use crate::db;
use crate::document_store::DocumentStore;
use crate::migrate;
use crate::vector_store::SqliteVectorIndex;

/// Locations of the two stores backing one [`DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub vector: PathBuf,
    pub relational: PathBuf,
}

impl StoreKey {
    pub fn new(vector: impl Into<PathBuf>, relational: impl Into<PathBuf>) -> Self {
        Self {
            vector: vector.into(),
            relational: relational.into(),
        }
    }

    fn normalized(&self) -> Result<Self> {
        Ok(Self {
            vector: absolute(&self.vector)?,
            relational: absolute(&self.relational)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Schema {
    Relational,
    Vectors,
}

#[derive(Default)]
struct Pools {
    by_path: HashMap<PathBuf, SqlitePool>,
    read_only: HashMap<PathBuf, SqlitePool>,
    migrated: HashSet<(PathBuf, Schema)>,
}

pub struct StoreRegistry {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingPolicy,
    embed_batch_size: usize,
    pools: Mutex<Pools>,
    stores: Mutex<HashMap<StoreKey, Arc<DocumentStore>>>,
}

impl StoreRegistry {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingPolicy) -> Self {
        Self {
            embedder,
            chunking,
            embed_batch_size: 64,
            pools: Mutex::new(Pools::default()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    async fn pool(&self, path: &Path, schema: Schema) -> Result<SqlitePool> {
        let path = absolute(path)?;
        let mut pools = self.pools.lock().await;

        let pool = match pools.by_path.get(&path) {
            Some(p) => p.clone(),
            None => {
                debug!(path = %path.display(), "opening sqlite pool");
                let p = db::connect(&path).await?;
                pools.by_path.insert(path.clone(), p.clone());
                p
            }
        };

        if pools.migrated.insert((path, schema)) {
            match schema {
                Schema::Relational => migrate::migrate_relational(&pool).await?,
                Schema::Vectors => migrate::migrate_vectors(&pool).await?,
            }
        }
        Ok(pool)
    }

    /// The shared, migrated pool for a relational file.
    pub async fn relational_pool(&self, path: &Path) -> Result<SqlitePool> {
        self.pool(path, Schema::Relational).await
    }

    /// A read-only pool on a relational file, for model-written queries.
    /// The file is created and migrated through the shared pool first.
    pub async fn read_only_pool(&self, path: &Path) -> Result<SqlitePool> {
        self.relational_pool(path).await?;
        let path = absolute(path)?;
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.read_only.get(&path) {
            return Ok(pool.clone());
        }
        debug!(path = %path.display(), "opening read-only sqlite pool");
        let pool = db::connect_read_only(&path).await?;
        pools.read_only.insert(path, pool.clone());
        Ok(pool)
    }

    /// The live store for `key`, opening it on first request.
    ///
    /// First open runs migrations on both files and reconciles any
    /// interrupted indexing recorded in the journal.
    pub async fn open(&self, key: &StoreKey) -> Result<Arc<DocumentStore>> {
        let key = key.normalized()?;
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }

        let relational = self.pool(&key.relational, Schema::Relational).await?;
        let vectors = self.pool(&key.vector, Schema::Vectors).await?;

        let store = Arc::new(
            DocumentStore::new(
                Arc::new(SqliteCatalog::new(relational)),
                Arc::new(SqliteVectorIndex::new(vectors)),
                Arc::clone(&self.embedder),
                self.chunking,
            )
            .with_embed_batch_size(self.embed_batch_size),
        );

        let reset = store.reconcile().await?;
        if reset > 0 {
            info!(paths = reset, "reconciled interrupted indexing");
        }

        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    pub async fn is_open(&self, key: &StoreKey) -> bool {
        match key.normalized() {
            Ok(key) => self.stores.lock().await.contains_key(&key),
            Err(_) => false,
        }
    }

    /// Drop every store and close every pool.
    pub async fn close_all(&self) {
        self.stores.lock().await.clear();
        let mut pools = self.pools.lock().await;
        for (path, pool) in pools.by_path.drain() {
            debug!(path = %path.display(), "closing sqlite pool");
            pool.close().await;
        }
        for (_, pool) in pools.read_only.drain() {
            pool.close().await;
        }
        pools.migrated.clear();
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
