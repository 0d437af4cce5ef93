//! Knowledge store: chunk embeddings, generations, similarity search

mod knowledge_base;
mod memory;
mod sqlite;
mod traits;

pub use knowledge_base::{KnowledgeBase, KnowledgeBaseStatus, RebuildReport};
pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;
pub use traits::{
    rank, IndexError, IndexFailure, IndexMetadata, IndexedChunk, OpenIndex, ScoredChunk,
    StoreError, StoreResult, VectorIndex,
};
