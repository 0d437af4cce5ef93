//! In-memory index backend

use super::traits::{
    rank, IndexMetadata, IndexedChunk, ScoredChunk, StoreError, StoreResult, VectorIndex,
};
use crate::chunk::Chunk;
use crate::embedding::cosine_similarity;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct Snapshot {
    generation: u64,
    metadata: Option<IndexMetadata>,
    entries: Vec<IndexedChunk>,
}

/// Non-persistent index.
///
/// The active generation is an immutable snapshot behind an `Arc`. Readers
/// clone the `Arc` and score without holding any lock; writers build the next
/// snapshot off to the side and swap the pointer.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    active: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> StoreResult<Arc<Snapshot>> {
        let guard = self.active.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Arc::clone(&guard))
    }

    fn publish(&self, next: Snapshot) -> StoreResult<()> {
        let mut guard = self.active.write().map_err(|_| StoreError::LockPoisoned)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

impl VectorIndex for MemoryIndex {
    fn replace_all(&self, chunks: Vec<IndexedChunk>, metadata: &IndexMetadata) -> StoreResult<u64> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let generation = self.snapshot()?.generation + 1;
        self.publish(Snapshot {
            generation,
            metadata: Some(metadata.clone()),
            entries: chunks,
        })?;
        Ok(generation)
    }

    fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot()?;
        let hits = snapshot
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();
        Ok(rank(hits, k))
    }

    fn clear(&self) -> StoreResult<u64> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let generation = self.snapshot()?.generation + 1;
        self.publish(Snapshot {
            generation,
            ..Snapshot::default()
        })?;
        Ok(generation)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.snapshot()?.entries.len())
    }

    fn generation(&self) -> StoreResult<u64> {
        Ok(self.snapshot()?.generation)
    }

    fn metadata(&self) -> StoreResult<Option<IndexMetadata>> {
        Ok(self.snapshot()?.metadata.clone())
    }

    fn chunks(&self) -> StoreResult<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .snapshot()?
            .entries
            .iter()
            .map(|entry| entry.chunk.clone())
            .collect();
        chunks.sort_by(|a, b| a.source.cmp(&b.source).then(a.sequence.cmp(&b.sequence)));
        Ok(chunks)
    }
}
