//! Embedding capability: text to fixed-length vectors
//!
//! The knowledge base is agnostic to how vectors are produced. Two backends
//! ship in-tree:
//! - `HashingEmbedder`: deterministic feature hashing, no model download
//!   (the default, and what the tests use)
//! - `FastEmbedEmbedder`: ONNX sentence embeddings, behind the `embeddings` feature

mod hashing;

pub use hashing::{HashingEmbedder, DEFAULT_DIMENSIONS};

use std::fmt;

/// Error type for embedding operations.
#[derive(Debug)]
pub enum EmbeddingError {
    /// The embedding model returned no results
    EmptyResult,
    /// The model returned a different number of vectors than texts
    CountMismatch { expected: usize, actual: usize },
    /// Model loading or inference failed
    ModelError(String),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::EmptyResult => write!(f, "embedding returned no results"),
            EmbeddingError::CountMismatch { expected, actual } => write!(
                f,
                "embedding returned {} vectors for {} texts",
                actual, expected
            ),
            EmbeddingError::ModelError(msg) => write!(f, "embedding model error: {}", msg),
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// Trait for embedding text into vectors.
///
/// Implementations must be deterministic for identical input and always
/// produce vectors of length `dimensions()`.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model, recorded alongside stored vectors so a
    /// store built with another model can be detected as stale.
    fn id(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, returning one vector per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or(EmbeddingError::EmptyResult)
    }
}

/// Cosine similarity between two vectors.
///
/// Zero vectors and length mismatches score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// L2-normalize a vector in place.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// FastEmbedEmbedder: production embedder behind `embeddings` feature
// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Production embedder backed by fastembed (ONNX Runtime).
    ///
    /// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
    /// method requires `&mut self`, while the `Embedder` trait uses `&self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        id: String,
        dimensions: usize,
    }

    impl FastEmbedEmbedder {
        /// Create an embedder for `model`, which must produce `dimensions`-length vectors.
        pub fn new(
            model: EmbeddingModel,
            name: &str,
            dimensions: usize,
        ) -> Result<Self, EmbeddingError> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                id: format!("fastembed:{}", name),
                dimensions,
            })
        }

        /// Create an embedder with the default model (all-MiniLM-L6-v2, 384 dims).
        pub fn default_model() -> Result<Self, EmbeddingError> {
            Self::new(EmbeddingModel::AllMiniLML6V2, "all-MiniLM-L6-v2", 384)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn id(&self) -> &str {
            &self.id
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| EmbeddingError::ModelError("embedding model lock poisoned".into()))?;
            let embeddings = model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            if embeddings.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            if embeddings.len() != texts.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: embeddings.len(),
                });
            }
            Ok(embeddings)
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;
