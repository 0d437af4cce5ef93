//! Retrieval of context for generation prompts

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::store::{KnowledgeBase, ScoredChunk, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of chunks retrieved per query
pub const DEFAULT_TOP_K: usize = 5;

/// Separator between chunk texts in a context string
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("knowledge base query failed: {0}")]
    Store(#[from] StoreError),
}

/// Turns a query into prompt context.
///
/// The infallible methods never surface an error: a failed lookup is
/// logged, recorded as a diagnostic, and treated as "no context".
#[derive(Clone)]
pub struct Retriever {
    knowledge_base: Arc<KnowledgeBase>,
    diagnostics: Arc<Diagnostics>,
}

impl Retriever {
    pub fn new(knowledge_base: Arc<KnowledgeBase>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            knowledge_base,
            diagnostics,
        }
    }

    pub fn try_retrieve_chunks(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let hits = self.knowledge_base.query(query, k)?;
        debug!(
            k,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );
        Ok(hits)
    }

    /// Ranked chunks for `query`; empty on failure.
    pub fn retrieve_chunks(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        match self.try_retrieve_chunks(query, k) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "retrieval failed; continuing without context");
                self.diagnostics
                    .record(DiagnosticKind::Retrieval, query, e.to_string());
                Vec::new()
            }
        }
    }

    /// Chunk texts for `query` in ranking order, separated by a blank line.
    pub fn retrieve(&self, query: &str, k: usize) -> String {
        join_context(&self.retrieve_chunks(query, k))
    }
}

pub fn join_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
