//! The knowledge base: an index plus the embedder that fills it

use super::traits::{
    IndexError, IndexFailure, IndexMetadata, IndexedChunk, ScoredChunk, StoreResult, VectorIndex,
};
use crate::chunk::Chunk;
use crate::embedding::{Embedder, EmbeddingError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Texts are embedded in batches of this many chunks.
const EMBED_BATCH_SIZE: usize = 64;

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    /// Generation that is now active
    pub generation: u64,
    /// Chunks that made it into the index
    pub indexed: usize,
    /// Chunks that were skipped
    pub failures: Vec<IndexError>,
}

/// Snapshot of the knowledge base for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeBaseStatus {
    pub generation: u64,
    pub chunks: usize,
    pub embedder_id: String,
    pub dimensions: usize,
}

/// Semantic store of chunks.
///
/// Owns nothing global: each pipeline holds its own instance. Cheap to share
/// behind an `Arc`; both collaborators are themselves thread-safe.
pub struct KnowledgeBase {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBase {
    /// Wrap `index`, discarding its contents if they were produced by a
    /// different embedder than `embedder`.
    pub fn open(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> StoreResult<Self> {
        let kb = Self { index, embedder };
        if let Some(stored) = kb.index.metadata()? {
            let current = kb.metadata();
            if stored != current {
                warn!(
                    stored_embedder = %stored.embedder_id,
                    stored_dimensions = stored.dimensions,
                    embedder = %current.embedder_id,
                    dimensions = current.dimensions,
                    "knowledge base was built with a different embedder; discarding stale generation"
                );
                kb.index.clear()?;
            }
        }
        Ok(kb)
    }

    fn metadata(&self) -> IndexMetadata {
        IndexMetadata {
            embedder_id: self.embedder.id().to_string(),
            dimensions: self.embedder.dimensions(),
        }
    }

    /// Embed `chunks` and make them the active generation.
    ///
    /// Per-chunk embedding failures are reported and skipped. A backend error
    /// is returned as-is and leaves the previous generation active.
    pub fn rebuild(&self, chunks: Vec<Chunk>) -> StoreResult<RebuildReport> {
        let mut failures = Vec::new();

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if seen.insert(chunk.id) {
                unique.push(chunk);
            } else {
                failures.push(IndexError::new(&chunk, IndexFailure::DuplicateId));
            }
        }

        let mut indexed = Vec::with_capacity(unique.len());
        for batch in unique.chunks(EMBED_BATCH_SIZE) {
            for (chunk, vector) in batch.iter().zip(self.embed_batch(batch)) {
                match vector.and_then(|v| self.check_vector(v)) {
                    Ok(embedding) => indexed.push(IndexedChunk {
                        chunk: chunk.clone(),
                        embedding,
                    }),
                    Err(reason) => failures.push(IndexError::new(chunk, reason)),
                }
            }
        }

        for failure in &failures {
            warn!(error = %failure, "skipping chunk");
        }

        let count = indexed.len();
        let generation = self.index.replace_all(indexed, &self.metadata())?;
        info!(
            generation,
            indexed = count,
            skipped = failures.len(),
            "knowledge base rebuilt"
        );

        Ok(RebuildReport {
            generation,
            indexed: count,
            failures,
        })
    }

    /// One result per chunk. A failed batch call is retried chunk by chunk so
    /// a single bad input only costs that chunk.
    fn embed_batch(&self, batch: &[Chunk]) -> Vec<Result<Vec<f32>, IndexFailure>> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).and_then(|vectors| {
            if vectors.len() == texts.len() {
                Ok(vectors)
            } else {
                Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: vectors.len(),
                })
            }
        });
        match vectors {
            Ok(vectors) => vectors.into_iter().map(Ok).collect(),
            Err(e) => {
                warn!(error = %e, "batch embedding failed; retrying per chunk");
                self.embed_each(&texts)
            }
        }
    }

    fn embed_each(&self, texts: &[&str]) -> Vec<Result<Vec<f32>, IndexFailure>> {
        texts
            .iter()
            .map(|text| {
                self.embedder
                    .embed(text)
                    .map_err(|e| IndexFailure::Embedding(e.to_string()))
            })
            .collect()
    }

    fn check_vector(&self, vector: Vec<f32>) -> Result<Vec<f32>, IndexFailure> {
        let expected = self.embedder.dimensions();
        if vector.len() != expected {
            return Err(IndexFailure::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        if !vector.iter().all(|v| v.is_finite()) {
            return Err(IndexFailure::NonFinite);
        }
        Ok(vector)
    }

    /// The `k` chunks most similar to `text`, best first.
    pub fn query(&self, text: &str, k: usize) -> StoreResult<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(text)?;
        let hits = self.index.search(&vector, k)?;
        debug!(k, hits = hits.len(), "knowledge base query");
        Ok(hits)
    }

    /// Remove every chunk.
    pub fn clear(&self) -> StoreResult<u64> {
        let generation = self.index.clear()?;
        info!(generation, "knowledge base cleared");
        Ok(generation)
    }

    pub fn count(&self) -> StoreResult<usize> {
        self.index.count()
    }

    pub fn generation(&self) -> StoreResult<u64> {
        self.index.generation()
    }

    /// All chunks of the active generation, ordered by source then sequence.
    pub fn chunks(&self) -> StoreResult<Vec<Chunk>> {
        self.index.chunks()
    }

    pub fn status(&self) -> StoreResult<KnowledgeBaseStatus> {
        Ok(KnowledgeBaseStatus {
            generation: self.index.generation()?,
            chunks: self.index.count()?,
            embedder_id: self.embedder.id().to_string(),
            dimensions: self.embedder.dimensions(),
        })
    }
}
