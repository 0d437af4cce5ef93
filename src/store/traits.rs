//! Storage trait definitions

use crate::chunk::Chunk;
use crate::embedding::EmbeddingError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Corrupt index entry: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A chunk together with the vector it is indexed under.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A query hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher = better)
    pub score: f32,
}

/// Which embedder produced the vectors of the active generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub embedder_id: String,
    pub dimensions: usize,
}

/// Why a single chunk could not be indexed.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFailure {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding contains non-finite values")]
    NonFinite,

    #[error("duplicate chunk identity in batch")]
    DuplicateId,
}

/// A per-chunk indexing failure. The chunk is skipped; the batch proceeds.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("failed to index chunk {sequence} of {source_name} ({chunk_id}): {reason}")]
pub struct IndexError {
    pub chunk_id: Uuid,
    pub source_name: String,
    pub sequence: usize,
    pub reason: IndexFailure,
}

impl IndexError {
    pub fn new(chunk: &Chunk, reason: IndexFailure) -> Self {
        Self {
            chunk_id: chunk.id,
            source_name: chunk.source.clone(),
            sequence: chunk.sequence,
            reason,
        }
    }
}

/// Trait for vector index backends
///
/// An index holds exactly one active generation of chunks. Implementations
/// must be thread-safe (Send + Sync) and must never let `search` observe a
/// mix of two generations: `replace_all` and `clear` are all-or-nothing from
/// a reader's point of view.
pub trait VectorIndex: Send + Sync {
    /// Replace the active generation with `chunks`, returning the new
    /// generation number. On error the previous generation stays active.
    fn replace_all(&self, chunks: Vec<IndexedChunk>, metadata: &IndexMetadata) -> StoreResult<u64>;

    /// The `k` chunks most similar to `query`, best first.
    fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>>;

    /// Remove every chunk, advancing the generation. Returns the new generation.
    fn clear(&self) -> StoreResult<u64>;

    /// Number of chunks in the active generation
    fn count(&self) -> StoreResult<usize>;

    /// The active generation number (0 for a never-built index)
    fn generation(&self) -> StoreResult<u64>;

    /// Embedder metadata recorded by the last `replace_all`, if any
    fn metadata(&self) -> StoreResult<Option<IndexMetadata>>;

    /// All chunks of the active generation, ordered by source then sequence
    fn chunks(&self) -> StoreResult<Vec<Chunk>>;
}

/// Extension trait for opening persistent indexes from paths
pub trait OpenIndex: VectorIndex + Sized {
    /// Open or create the named collection in the store at `path`
    fn open(path: impl AsRef<Path>, collection: &str) -> StoreResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory(collection: &str) -> StoreResult<Self>;
}

/// Order hits by decreasing score, breaking ties by source name then
/// sequence index, and keep at most `k`.
pub fn rank(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.source.cmp(&b.chunk.source))
            .then_with(|| a.chunk.sequence.cmp(&b.chunk.sequence))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: &str, sequence: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(source, sequence, format!("{source}-{sequence}")),
            score,
        }
    }

    #[test]
    fn rank_orders_by_score_then_source_then_sequence() {
        let ranked = rank(
            vec![
                hit("b.md", 0, 0.5),
                hit("a.md", 1, 0.5),
                hit("c.md", 0, 0.9),
                hit("a.md", 0, 0.5),
            ],
            10,
        );
        let order: Vec<(String, usize)> = ranked
            .iter()
            .map(|h| (h.chunk.source.clone(), h.chunk.sequence))
            .collect();
        assert_eq!(
            order,
            vec![
                ("c.md".to_string(), 0),
                ("a.md".to_string(), 0),
                ("a.md".to_string(), 1),
                ("b.md".to_string(), 0),
            ]
        );
    }

    #[test]
    fn rank_truncates_to_k() {
        let ranked = rank(vec![hit("a", 0, 0.1), hit("a", 1, 0.2), hit("a", 2, 0.3)], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.sequence, 2);
        assert!(rank(vec![hit("a", 0, 0.1)], 0).is_empty());
    }

    #[test]
    fn index_error_message_names_the_chunk() {
        let chunk = Chunk::new("pricing.md", 3, "text");
        let err = IndexError::new(
            &chunk,
            IndexFailure::DimensionMismatch { expected: 4, actual: 2 },
        );
        let msg = err.to_string();
        assert!(msg.contains("chunk 3 of pricing.md"));
        assert!(msg.contains("2 dimensions, expected 4"));
    }
}
