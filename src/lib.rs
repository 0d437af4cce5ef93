//! Quarry: document knowledge base with grounded QA generation
//!
//! Ingests product documents (text, markdown, HTML, JSON, PDF) into a
//! chunked, embedded knowledge base and uses retrieved context to ground an
//! LLM when generating test cases and Selenium scripts.
//!
//! # Core Concepts
//!
//! - **Documents**: named raw bytes, parsed to plain text by extension
//! - **Chunks**: overlapping windows of a document, identified by source and sequence
//! - **Generations**: each rebuild replaces the whole knowledge base atomically
//!
//! # Example
//!
//! ```
//! use quarry::{Document, MockGenerator, QaPipeline};
//! use std::sync::Arc;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let pipeline = QaPipeline::builder()
//!     .generator(Arc::new(MockGenerator::new()))
//!     .build()
//!     .unwrap();
//! let report = rt
//!     .block_on(pipeline.build_knowledge_base(vec![Document::new("pricing.md", "Use SAVE15.")]))
//!     .unwrap();
//! assert_eq!(report.chunks_indexed, 1);
//! ```

pub mod chunk;
pub mod config;
pub mod diagnostics;
pub mod embedding;
pub mod generate;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod parse;
pub mod pipeline;
pub mod retrieve;
pub mod store;

pub use chunk::{Chunk, ChunkConfig};
pub use config::{ConfigError, QuarryConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use embedding::{Embedder, HashingEmbedder};
pub use generate::{GenerationError, Generator, TestCase};
pub use llm::{GeminiClient, LlmError, MockGenerator, TextGenerator};
pub use parse::{Document, DocumentKind, ParseError};
pub use pipeline::{IngestFailure, IngestReport, PipelineError, PipelineStatus, QaPipeline};
pub use retrieve::Retriever;
pub use store::{KnowledgeBase, MemoryIndex, OpenIndex, ScoredChunk, SqliteIndex, StoreError, VectorIndex};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
