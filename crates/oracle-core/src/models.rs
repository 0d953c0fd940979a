//! Core data models shared by the indexing and retrieval pipeline.
//!
//! A [`DocumentRecord`] is the catalog row for one tracked file. Its text is
//! split into [`ChunkRecord`]s, each stamped with [`ChunkMetadata`] that
//! ties it back to the file path and the digest it was produced from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog row for one indexed source file.
///
/// At most one record exists per `filepath`. `content_hash` is the digest
/// of the raw file bytes at the time of the last successful index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filepath: String,
    pub content_hash: String,
    pub chunk_count: i64,
    /// RFC 3339 timestamp of the last index pass.
    pub last_indexed: String,
}

/// Coarse classification of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Code => "code",
            ContentType::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(ContentType::Code),
            "text" => Some(ContentType::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance stamped onto every chunk.
///
/// `source` is the exact file path the chunk was produced from; it is the
/// key used to delete a file's previous generation of chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub content_hash: String,
    pub indexed_at: String,
    pub content_type: ContentType,
    pub language: String,
    /// Character offset of the chunk within the original file.
    pub start_index: usize,
}

/// A bounded slice of a document, ready to be embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// A chunk returned from similarity search with its cosine score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f64,
}
