//! The QA pipeline facade
//!
//! Owns one knowledge base and everything needed to fill it and to generate
//! from it. Shareable across tasks behind an `Arc`.

use crate::chunk::{chunk_document, ChunkConfig};
use crate::config::{ConfigError, EmbeddingBackend, EmbeddingConfig, QuarryConfig, DEFAULT_COLLECTION};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::embedding::{Embedder, EmbeddingError, HashingEmbedder};
use crate::generate::{GenerationError, Generator, TestCase, DEFAULT_TIMEOUT};
use crate::llm::{GeminiClient, LlmError, TextGenerator};
use crate::parse::{parse, Document, ParseError};
use crate::retrieve::{RetrievalError, Retriever, DEFAULT_TOP_K};
use crate::store::{
    IndexError, KnowledgeBase, KnowledgeBaseStatus, MemoryIndex, OpenIndex, ScoredChunk,
    SqliteIndex, StoreError, VectorIndex,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Errors raised while assembling a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("no text generator configured")]
    MissingGenerator,
}

/// One item of a batch that did not make it into the knowledge base.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum IngestFailure {
    /// The document was unreadable, unsupported, malformed or a duplicate.
    Parse { document: String, message: String },
    /// A chunk could not be embedded.
    Index(IndexError),
}

/// Outcome of building the knowledge base.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Documents in the batch, including unreadable ones
    pub documents: usize,
    /// Documents whose text was extracted
    pub parsed: usize,
    /// Chunks now queryable
    pub chunks_indexed: usize,
    /// Active generation after the rebuild
    pub generation: u64,
    pub failures: Vec<IngestFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub collection: String,
    #[serde(flatten)]
    pub knowledge_base: KnowledgeBaseStatus,
}

pub struct QaPipeline {
    knowledge_base: Arc<KnowledgeBase>,
    retriever: Retriever,
    generator: Generator,
    chunking: ChunkConfig,
    diagnostics: Arc<Diagnostics>,
    collection: String,
    top_k: usize,
}

impl QaPipeline {
    pub fn builder() -> QaPipelineBuilder {
        QaPipelineBuilder::default()
    }

    /// Wire the SQLite store, the configured embedder and the Gemini client.
    pub fn from_config(config: &QuarryConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let index = SqliteIndex::open(&config.database, &config.collection)?;
        let embedder = embedder_from_config(&config.embedding)?;
        let generation = &config.generation;
        let llm = GeminiClient::from_env(
            &generation.base_url,
            &generation.model,
            &generation.api_key_env,
            generation.timeout(),
        )?;

        Self::builder()
            .index(Arc::new(index))
            .embedder(embedder)
            .generator(Arc::new(llm))
            .chunking(config.chunking)
            .top_k(config.retrieval.top_k)
            .timeout(generation.timeout())
            .collection(&config.collection)
            .build()
    }

    fn record_parse_failure(&self, document: &str, message: String, failures: &mut Vec<IngestFailure>) {
        warn!(document, error = %message, "document skipped; continuing with the rest of the batch");
        self.diagnostics
            .record(DiagnosticKind::Parse, document, message.clone());
        failures.push(IngestFailure::Parse {
            document: document.to_string(),
            message,
        });
    }

    /// Replace the knowledge base with the contents of `documents`.
    ///
    /// Per-document and per-chunk failures are reported, never fatal. Only a
    /// backend failure is returned as an error, in which case the previous
    /// generation stays active.
    pub async fn build_knowledge_base(&self, documents: Vec<Document>) -> Result<IngestReport, StoreError> {
        let pending = documents.into_iter().map(Pending::Loaded).collect();
        self.ingest(pending, Vec::new()).await
    }

    /// Read `paths` (files, or directories walked recursively) and rebuild
    /// the knowledge base from them.
    ///
    /// The walk and every file read run on the blocking pool.
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Result<IngestReport, StoreError> {
        let roots = paths.to_vec();
        let (pending, walk_errors) = tokio::task::spawn_blocking(move || collect_files(&roots))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?;

        let mut failures = Vec::new();
        for (subject, message) in walk_errors {
            self.record_parse_failure(&subject, message, &mut failures);
        }
        self.ingest(pending, failures).await
    }

    async fn ingest(
        &self,
        pending: Vec<Pending>,
        mut failures: Vec<IngestFailure>,
    ) -> Result<IngestReport, StoreError> {
        let total = pending.len() + failures.len();

        // Read, parse and chunk every document on the blocking pool, in parallel
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(pending.len());
        for item in pending {
            let name = item.name().to_string();
            if !seen.insert(name.clone()) {
                let err = ParseError::DuplicateName(name.clone());
                self.record_parse_failure(&name, err.to_string(), &mut failures);
                continue;
            }
            let config = self.chunking;
            let task = tokio::task::spawn_blocking(move || {
                let document = item.load()?;
                parse(&document).map(|text| chunk_document(&document.name, &text, &config))
            });
            tasks.push((name, task));
        }

        let mut parsed = 0;
        let mut chunks = Vec::new();
        for (name, task) in tasks {
            match task.await {
                Ok(Ok(document_chunks)) => {
                    parsed += 1;
                    chunks.extend(document_chunks);
                }
                Ok(Err(e)) => self.record_parse_failure(&name, e.to_string(), &mut failures),
                Err(e) => self.record_parse_failure(&name, format!("parser task failed: {}", e), &mut failures),
            }
        }

        let knowledge_base = Arc::clone(&self.knowledge_base);
        let rebuild = tokio::task::spawn_blocking(move || knowledge_base.rebuild(chunks))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        for failure in &rebuild.failures {
            self.diagnostics.record(
                DiagnosticKind::Index,
                format!("{}#{}", failure.source_name, failure.sequence),
                failure.reason.to_string(),
            );
            failures.push(IngestFailure::Index(failure.clone()));
        }

        info!(
            documents = total,
            parsed,
            chunks = rebuild.indexed,
            failures = failures.len(),
            generation = rebuild.generation,
            "knowledge base built"
        );

        Ok(IngestReport {
            documents: total,
            parsed,
            chunks_indexed: rebuild.indexed,
            generation: rebuild.generation,
            failures,
        })
    }

    pub fn clear_knowledge_base(&self) -> Result<u64, StoreError> {
        self.knowledge_base.clear()
    }

    /// Ranked chunks for `text`.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        self.retriever.try_retrieve_chunks(text, k)
    }

    /// Context string for `text` using the configured `top_k`.
    pub fn retrieve(&self, text: &str) -> String {
        self.retriever.retrieve(text, self.top_k)
    }

    pub async fn generate_test_cases(&self, feature: &str) -> Vec<TestCase> {
        self.generator.generate_test_cases(feature).await
    }

    pub async fn try_generate_test_cases(&self, feature: &str) -> Result<Vec<TestCase>, GenerationError> {
        self.generator.try_generate_test_cases(feature).await
    }

    pub async fn generate_script(&self, test_case: &TestCase, page_markup: Option<&str>) -> String {
        self.generator.generate_script(test_case, page_markup).await
    }

    pub async fn try_generate_script(
        &self,
        test_case: &TestCase,
        page_markup: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.generator.try_generate_script(test_case, page_markup).await
    }

    pub fn status(&self) -> Result<PipelineStatus, StoreError> {
        Ok(PipelineStatus {
            collection: self.collection.clone(),
            knowledge_base: self.knowledge_base.status()?,
        })
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/// A document in a batch, either in memory or still on disk.
enum Pending {
    Loaded(Document),
    File { path: PathBuf, name: String },
}

impl Pending {
    fn file(path: PathBuf, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| display_name(&path));
        Pending::File { path, name }
    }

    fn name(&self) -> &str {
        match self {
            Pending::Loaded(document) => &document.name,
            Pending::File { name, .. } => name,
        }
    }

    /// Blocking: reads the file for `File`.
    fn load(self) -> Result<Document, ParseError> {
        match self {
            Pending::Loaded(document) => Ok(document),
            Pending::File { path, name } => {
                let mut document = Document::from_path(&path)?;
                document.name = name;
                Ok(document)
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Expand `roots` into files in batch order. Blocking.
///
/// Walk errors are returned as `(subject, message)` pairs.
fn collect_files(roots: &[PathBuf]) -> (Vec<Pending>, Vec<(String, String)>) {
    let mut pending = Vec::new();
    let mut errors = Vec::new();

    for root in roots {
        if !root.is_dir() {
            pending.push(Pending::file(root.clone(), None));
            continue;
        }
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let name = relative_name(root, entry.path());
                    pending.push(Pending::file(entry.into_path(), Some(name)));
                }
                Ok(_) => {}
                Err(e) => {
                    let subject = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    errors.push((subject, e.to_string()));
                }
            }
        }
    }
    (pending, errors)
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, PipelineError> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        #[cfg(feature = "embeddings")]
        EmbeddingBackend::Fastembed => {
            let embedder = crate::embedding::FastEmbedEmbedder::default_model()?;
            if embedder.dimensions() != config.dimensions {
                return Err(ConfigError::Invalid(format!(
                    "embedding.dimensions is {} but the fastembed model produces {}",
                    config.dimensions,
                    embedder.dimensions()
                ))
                .into());
            }
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "embeddings"))]
        EmbeddingBackend::Fastembed => Err(ConfigError::Invalid(
            "the fastembed backend requires building with the `embeddings` feature".to_string(),
        )
        .into()),
    }
}

/// Assembles a [`QaPipeline`] from injected collaborators.
///
/// Defaults: in-memory index, hashing embedder, default chunking, top-k and
/// timeout. The text generator has no default.
pub struct QaPipelineBuilder {
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Option<Arc<dyn TextGenerator>>,
    chunking: ChunkConfig,
    top_k: usize,
    timeout: Duration,
    collection: String,
    diagnostics: Option<Arc<Diagnostics>>,
}

impl Default for QaPipelineBuilder {
    fn default() -> Self {
        Self {
            index: None,
            embedder: None,
            generator: None,
            chunking: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            timeout: DEFAULT_TIMEOUT,
            collection: DEFAULT_COLLECTION.to_string(),
            diagnostics: None,
        }
    }
}

impl QaPipelineBuilder {
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name reported by `status`; the index itself is already bound to a collection.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Share a diagnostics collector with the caller.
    pub fn diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn build(self) -> Result<QaPipeline, PipelineError> {
        let llm = self.generator.ok_or(PipelineError::MissingGenerator)?;
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be greater than zero".into()).into());
        }

        let index: Arc<dyn VectorIndex> = match self.index {
            Some(index) => index,
            None => Arc::new(MemoryIndex::new()),
        };
        let embedder: Arc<dyn Embedder> = match self.embedder {
            Some(embedder) => embedder,
            None => Arc::new(HashingEmbedder::default()),
        };
        let diagnostics = self.diagnostics.unwrap_or_default();

        let knowledge_base = Arc::new(KnowledgeBase::open(index, embedder)?);
        let retriever = Retriever::new(Arc::clone(&knowledge_base), Arc::clone(&diagnostics));
        let generator = Generator::new(
            retriever.clone(),
            llm,
            Arc::clone(&diagnostics),
            self.top_k,
            self.timeout,
        );

        Ok(QaPipeline {
            knowledge_base,
            retriever,
            generator,
            chunking: self.chunking,
            diagnostics,
            collection: self.collection,
            top_k: self.top_k,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;

    fn pipeline() -> QaPipeline {
        QaPipeline::builder()
            .generator(Arc::new(MockGenerator::new().with_fallback("[]")))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_per_item() {
        let pipeline = pipeline();
        let report = pipeline
            .build_knowledge_base(vec![
                Document::new("notes.txt", "first version"),
                Document::new("notes.txt", "second version"),
            ])
            .await
            .unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.parsed, 1);
        assert_eq!(report.chunks_indexed, 1);
        assert!(matches!(
            &report.failures[..],
            [IngestFailure::Parse { document, .. }] if document == "notes.txt"
        ));

        let chunks = pipeline.knowledge_base().chunks().unwrap();
        assert_eq!(chunks[0].text, "first version");
    }

    #[tokio::test]
    async fn bad_document_does_not_abort_batch() {
        let pipeline = pipeline();
        let report = pipeline
            .build_knowledge_base(vec![
                Document::new("broken.json", "{not json"),
                Document::new("image.png", vec![0x89, 0x50]),
                Document::new("guide.md", "# Guide\nUse SAVE15."),
            ])
            .await
            .unwrap();

        assert_eq!(report.parsed, 1);
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(pipeline.diagnostics().count(DiagnosticKind::Parse), 2);
    }

    #[tokio::test]
    async fn chunk_order_follows_batch_order() {
        let pipeline = QaPipeline::builder()
            .generator(Arc::new(MockGenerator::new()))
            .chunking(ChunkConfig::new(4, 1).unwrap())
            .build()
            .unwrap();
        let report = pipeline
            .build_knowledge_base(vec![
                Document::new("b.txt", "abcdefghij"),
                Document::new("a.txt", "klmnop"),
            ])
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 5);

        let listed: Vec<(String, usize)> = pipeline
            .knowledge_base()
            .chunks()
            .unwrap()
            .into_iter()
            .map(|c| (c.source, c.sequence))
            .collect();
        assert_eq!(listed.len(), 5);
        assert_eq!(listed[0], ("a.txt".to_string(), 0));
    }

    #[tokio::test]
    async fn ingest_paths_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("pricing.md"), "Apply code SAVE15 for 15% off").unwrap();
        std::fs::write(dir.path().join("nested").join("faq.txt"), "Shipping is free").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "skip me").unwrap();

        let pipeline = pipeline();
        let report = pipeline
            .ingest_paths(&[dir.path().to_path_buf(), dir.path().join("missing.md")])
            .await
            .unwrap();

        assert_eq!(report.parsed, 2);
        assert_eq!(report.chunks_indexed, 2);
        assert_eq!(report.failures.len(), 1, "missing file is reported");

        let sources: Vec<String> = pipeline
            .knowledge_base()
            .chunks()
            .unwrap()
            .into_iter()
            .map(|c| c.source)
            .collect();
        assert_eq!(sources, vec!["nested/faq.txt", "pricing.md"]);
    }

    #[tokio::test]
    async fn files_are_named_and_deduplicated_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            std::fs::write(dir.path().join(sub).join("notes.txt"), format!("notes from {sub}")).unwrap();
        }

        let pipeline = pipeline();
        let report = pipeline
            .ingest_paths(&[
                dir.path().join("a").join("notes.txt"),
                dir.path().join("b").join("notes.txt"),
                dir.path().join("c").join("gone.md"),
            ])
            .await
            .unwrap();

        assert_eq!(report.documents, 3);
        assert_eq!(report.parsed, 1);
        let failed: Vec<&str> = report
            .failures
            .iter()
            .filter_map(|f| match f {
                IngestFailure::Parse { document, .. } => Some(document.as_str()),
                IngestFailure::Index(_) => None,
            })
            .collect();
        assert_eq!(failed, vec!["notes.txt", "gone.md"]);

        let chunks = pipeline.knowledge_base().chunks().unwrap();
        assert_eq!(chunks[0].text, "notes from a");
    }

    #[tokio::test]
    async fn status_reports_collection_and_counts() {
        let pipeline = QaPipeline::builder()
            .generator(Arc::new(MockGenerator::new()))
            .collection("staging")
            .build()
            .unwrap();
        pipeline
            .build_knowledge_base(vec![Document::new("a.txt", "alpha")])
            .await
            .unwrap();

        let status = pipeline.status().unwrap();
        assert_eq!(status.collection, "staging");
        assert_eq!(status.knowledge_base.chunks, 1);
        assert_eq!(status.knowledge_base.generation, 1);

        pipeline.clear_knowledge_base().unwrap();
        assert_eq!(pipeline.status().unwrap().knowledge_base.chunks, 0);
    }

    #[test]
    fn builder_requires_generator_and_positive_top_k() {
        assert!(matches!(
            QaPipeline::builder().build(),
            Err(PipelineError::MissingGenerator)
        ));
        assert!(matches!(
            QaPipeline::builder()
                .generator(Arc::new(MockGenerator::new()))
                .top_k(0)
                .build(),
            Err(PipelineError::Config(_))
        ));
    }

    #[cfg(not(feature = "embeddings"))]
    #[test]
    fn fastembed_backend_needs_feature() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Fastembed,
            dimensions: 384,
        };
        assert!(matches!(
            embedder_from_config(&config),
            Err(PipelineError::Config(ConfigError::Invalid(_)))
        ));
    }
}
