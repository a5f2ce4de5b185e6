//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] owns the current [`EmbeddingIndex`], the configuration
//! and the injected providers, and tracks its lifecycle explicitly:
//!
//! ```text
//! Uninitialized ──initialize──▶ Building ──▶ Ready ──initialize──▶ Building ──▶ Ready
//!       ▲                          │                                  │
//!       │                          ▼                                  ▼
//!       └──────────────────────  Failed                  Failed ──▶ Ready (previous index kept)
//! ```
//!
//! `Failed` is held only while the failure is reported; the pipeline then
//! settles back to `Uninitialized`, or to `Ready` when an older index is still
//! published. [`RagPipeline::last_build_error`] keeps the details.
//!
//! A rebuild constructs the new index completely before swapping it in, so
//! concurrent queries see either the old index or the new one.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{DirectorySource, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .completion_provider(Arc::new(my_model))
//!     .build()?;
//!
//! let report = pipeline.initialize(&DirectorySource::new("documentos")).await?;
//! let response = pipeline.query("What is the notice period?").await;
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::completion::CompletionProvider;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, QueryResponse, QueryResult, SearchResult, Source};
use crate::embedding::EmbeddingProvider;
use crate::error::{BuildError, BuildFailure, ExtractionFailure, RagError, Result};
use crate::extract::normalize_whitespace;
use crate::index::{BuildOptions, EmbeddingIndex};
use crate::retriever::Retriever;
use crate::source::DocumentSource;
use crate::synthesis::AnswerSynthesizer;

/// Answer returned by [`RagPipeline::query`] before any index is ready.
pub const NOT_INITIALIZED_ANSWER: &str =
    "The system is not initialized. Load the documents before asking questions.";

/// Prefix of the answer returned by [`RagPipeline::query`] when answering fails.
pub const QUERY_FAILED_ANSWER: &str = "Sorry, I could not answer that question right now";

/// Where the pipeline is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// No index has been built yet.
    Uninitialized,
    /// A build is running. Queries use the previous index, if any.
    Building,
    /// An index is published and queries are answered from it.
    Ready,
    /// A build just failed and its failure is being reported.
    Failed,
}

/// Progress notifications emitted during [`RagPipeline::initialize`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The source is being read.
    LoadingDocuments {
        /// The source description.
        source: String,
    },
    /// A file could not be extracted and will not be indexed.
    DocumentSkipped {
        /// The skipped file.
        path: PathBuf,
        /// Why it was skipped.
        message: String,
    },
    /// Extraction finished.
    DocumentsLoaded {
        /// Documents extracted successfully.
        loaded: usize,
        /// Files skipped.
        skipped: usize,
    },
    /// Chunking finished.
    Chunked {
        /// Documents that produced at least one chunk.
        documents: usize,
        /// Total chunks to embed.
        chunks: usize,
    },
    /// An embedding batch completed.
    Embedding {
        /// Batches completed so far.
        completed_batches: usize,
        /// Total batches in this build.
        total_batches: usize,
    },
    /// The new index is published.
    Ready {
        /// Records in the new index.
        chunks: usize,
    },
    /// The build failed.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
}

/// Callback receiving [`ProgressEvent`]s.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Summary of a successful build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Description of the document source.
    pub source: String,
    /// Documents that contributed chunks.
    pub document_count: usize,
    /// Chunks embedded into the index.
    pub chunk_count: usize,
    /// Files skipped along the way, with reasons.
    #[serde(skip)]
    pub skipped: Vec<ExtractionFailure>,
    /// When the index was built.
    pub built_at: DateTime<Utc>,
}

struct Shared {
    state: PipelineState,
    index: Option<Arc<EmbeddingIndex>>,
    last_error: Option<BuildError>,
}

/// The RAG pipeline orchestrator.
///
/// Coordinates index builds (load → chunk → embed → publish) and query
/// execution (embed → search → synthesize). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    progress: Option<ProgressCallback>,
    shared: RwLock<Shared>,
    build_lock: Mutex<()>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> PipelineState {
        self.shared.read().await.state
    }

    /// The published index, if any.
    pub async fn index(&self) -> Option<Arc<EmbeddingIndex>> {
        self.shared.read().await.index.clone()
    }

    /// The error from the most recent failed build, cleared by a successful one.
    pub async fn last_build_error(&self) -> Option<BuildError> {
        self.shared.read().await.last_error.clone()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    /// Build a new index from `source` and publish it.
    ///
    /// Files that fail extraction, and documents without text, are skipped and
    /// listed in the report. Builds are serialized; a second call waits for
    /// the first to finish.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when the source is unavailable or empty, when
    /// no document yields any text, or when embedding fails. The previously
    /// published index, if any, stays in place.
    pub async fn initialize(
        &self,
        source: &dyn DocumentSource,
    ) -> std::result::Result<BuildReport, BuildError> {
        let _build = self.build_lock.lock().await;
        self.shared.write().await.state = PipelineState::Building;

        let description = source.describe();
        info!(source = %description, "building document index");
        self.emit(ProgressEvent::LoadingDocuments { source: description.clone() });

        let loaded = match source.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                let err = BuildError::new(BuildFailure::Source(e.to_string()), vec![]);
                return Err(self.fail(err).await);
            }
        };

        let mut skipped = loaded.failures;
        for failure in &skipped {
            self.emit(ProgressEvent::DocumentSkipped {
                path: failure.path.clone(),
                message: failure.message.clone(),
            });
        }
        self.emit(ProgressEvent::DocumentsLoaded {
            loaded: loaded.documents.len(),
            skipped: skipped.len(),
        });

        if loaded.documents.is_empty() && skipped.is_empty() {
            let err = BuildError::new(BuildFailure::NoDocuments(description), vec![]);
            return Err(self.fail(err).await);
        }

        let (chunks, document_count) = self.chunk_documents(loaded.documents, &mut skipped);
        if chunks.is_empty() {
            return Err(self.fail(BuildError::new(BuildFailure::NoUsableDocuments, skipped)).await);
        }
        self.emit(ProgressEvent::Chunked { documents: document_count, chunks: chunks.len() });

        let on_batch = |completed_batches: usize, total_batches: usize| {
            self.emit(ProgressEvent::Embedding { completed_batches, total_batches });
        };
        let index = match EmbeddingIndex::build_with_progress(
            chunks,
            self.embedding_provider.as_ref(),
            BuildOptions::from(&self.config),
            &on_batch,
        )
        .await
        {
            Ok(index) => index,
            Err(e) => {
                let err = BuildError::new(BuildFailure::Embedding(e.to_string()), skipped);
                return Err(self.fail(err).await);
            }
        };

        let report = BuildReport {
            source: description,
            document_count,
            chunk_count: index.len(),
            skipped,
            built_at: index.built_at(),
        };
        self.publish(index).await;

        info!(
            source = %report.source,
            document_count = report.document_count,
            chunk_count = report.chunk_count,
            skipped = report.skipped.len(),
            "document index ready"
        );
        self.emit(ProgressEvent::Ready { chunks: report.chunk_count });
        Ok(report)
    }

    /// Chunk every document, recording blank and duplicate documents as skipped.
    fn chunk_documents(
        &self,
        documents: Vec<Document>,
        skipped: &mut Vec<ExtractionFailure>,
    ) -> (Vec<Chunk>, usize) {
        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        let mut document_count = 0;

        for mut document in documents {
            let path = document.source_path.clone().unwrap_or_else(|| PathBuf::from(&document.id));
            if !seen.insert(document.id.clone()) {
                warn!(document.id = %document.id, "duplicate document id, skipping");
                self.skip(skipped, path, "duplicate document id");
                continue;
            }

            if self.config.normalize_whitespace {
                for page in &mut document.pages {
                    page.text = normalize_whitespace(&page.text);
                }
            }

            let document_chunks = self.chunker.chunk(&document);
            if document_chunks.is_empty() || document.is_blank() {
                warn!(document.id = %document.id, "document has no extractable text, skipping");
                self.skip(skipped, path, "no extractable text");
                continue;
            }

            info!(
                document.id = %document.id,
                chunk_count = document_chunks.len(),
                "chunked document"
            );
            document_count += 1;
            chunks.extend(document_chunks);
        }

        (chunks, document_count)
    }

    fn skip(&self, skipped: &mut Vec<ExtractionFailure>, path: PathBuf, message: &str) {
        self.emit(ProgressEvent::DocumentSkipped {
            path: path.clone(),
            message: message.to_string(),
        });
        skipped.push(ExtractionFailure { path, message: message.to_string() });
    }

    async fn publish(&self, index: EmbeddingIndex) {
        let mut shared = self.shared.write().await;
        shared.index = Some(Arc::new(index));
        shared.state = PipelineState::Ready;
        shared.last_error = None;
    }

    async fn fail(&self, err: BuildError) -> BuildError {
        error!(error = %err, "document index build failed");
        {
            let mut shared = self.shared.write().await;
            shared.state = PipelineState::Failed;
            shared.last_error = Some(err.clone());
        }
        self.emit(ProgressEvent::Failed { message: err.to_string() });

        let mut shared = self.shared.write().await;
        shared.state = match shared.index {
            Some(_) => PipelineState::Ready,
            None => PipelineState::Uninitialized,
        };
        err
    }

    /// Retrieve up to `k` chunks for `question` from the published index.
    ///
    /// # Errors
    ///
    /// See [`Retriever::retrieve`].
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<SearchResult>> {
        let index = self.index().await;
        self.retriever.retrieve(index.as_deref(), question, k).await
    }

    /// Answer `question`, returning typed errors.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] for a blank question
    /// - [`RagError::NotInitialized`] when no index is published
    /// - [`RagError::EmbeddingError`] when the question cannot be embedded
    /// - [`RagError::SynthesisError`] when the language model fails
    pub async fn try_query(&self, question: &str) -> Result<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidArgument("question must not be empty".into()));
        }

        let retrieved = self.retrieve(question, self.config.top_k).await?;
        let answer = self.synthesizer.answer(question, &retrieved).await?;
        info!(
            retrieved = retrieved.len(),
            used = answer.used_chunks.len(),
            "query answered"
        );
        Ok(QueryResult { retrieved, answer })
    }

    /// Answer `question`. Never fails.
    ///
    /// Before an index is ready the answer is [`NOT_INITIALIZED_ANSWER`].
    /// Any other failure yields an apologetic answer starting with
    /// [`QUERY_FAILED_ANSWER`]. In both cases `sources` is empty.
    pub async fn query(&self, question: &str) -> QueryResponse {
        match self.try_query(question).await {
            Ok(result) => QueryResponse {
                answer: result.answer.text,
                sources: result
                    .answer
                    .used_chunks
                    .iter()
                    .map(|r| Source::from_result(r, self.config.excerpt_chars))
                    .collect(),
            },
            Err(RagError::NotInitialized) => QueryResponse::degraded(NOT_INITIALIZED_ANSWER),
            Err(e) => {
                warn!(error = %e, "query degraded");
                QueryResponse::degraded(format!("{QUERY_FAILED_ANSWER}: {e}"))
            }
        }
    }

    /// Write the published index to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] if no index is published, or
    /// [`RagError::PersistenceError`] if writing fails.
    pub async fn save_index(&self, path: impl AsRef<Path>) -> Result<()> {
        let index = self.index().await.ok_or(RagError::NotInitialized)?;
        let path = path.as_ref().to_path_buf();
        let save_path = path.clone();
        run_blocking(&path, move || index.save(&save_path)).await
    }

    /// Publish an index previously written by [`save_index`](Self::save_index).
    ///
    /// Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if the file cannot be read, and
    /// [`RagError::EmbeddingError`] if its dimension differs from the
    /// configured embedding provider's.
    pub async fn load_index(&self, path: impl AsRef<Path>) -> Result<usize> {
        let _build = self.build_lock.lock().await;
        let path = path.as_ref().to_path_buf();
        let load_path = path.clone();
        let index = run_blocking(&path, move || EmbeddingIndex::load(&load_path)).await?;

        let expected = self.embedding_provider.dimensions();
        if expected > 0 && !index.is_empty() && index.dimensions() != expected {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.name().to_string(),
                message: format!(
                    "index at {} has dimension {}, provider produces {expected}",
                    path.display(),
                    index.dimensions()
                ),
            });
        }

        if index.is_empty() {
            return Err(RagError::PersistenceError {
                path,
                message: "index holds no records".into(),
            });
        }

        let count = index.len();
        self.publish(index).await;
        info!(path = %path.display(), record_count = count, "published persisted index");
        self.emit(ProgressEvent::Ready { chunks: count });
        Ok(count)
    }
}

async fn run_blocking<T: Send + 'static>(
    path: &Path,
    task: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(task).await.map_err(|e| RagError::PersistenceError {
        path: path.to_path_buf(),
        message: format!("index I/O task failed: {e}"),
    })?
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding and completion providers are required. The configuration
/// defaults to [`RagConfig::default`] and the chunker to a
/// [`FixedSizeChunker`] using the configured size and overlap.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .completion_provider(Arc::new(model))
///     .on_progress(Arc::new(|event| println!("{event:?}")))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    completion_provider: Option<Arc<dyn CompletionProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    progress: Option<ProgressCallback>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both documents and questions.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the language model used to synthesize answers.
    pub fn completion_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion_provider = Some(provider);
        self
    }

    /// Replace the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Receive [`ProgressEvent`]s during builds.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a provider is missing, and the
    /// errors of [`RagConfig::validate`] for an inconsistent configuration.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let completion_provider = self
            .completion_provider
            .ok_or_else(|| RagError::ConfigError("completion_provider is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        let retriever = Retriever::new(Arc::clone(&embedding_provider))
            .with_similarity_threshold(config.similarity_threshold);
        let synthesizer = AnswerSynthesizer::from_config(completion_provider, &config);

        Ok(RagPipeline {
            config,
            embedding_provider,
            chunker,
            retriever,
            synthesizer,
            progress: self.progress,
            shared: RwLock::new(Shared {
                state: PipelineState::Uninitialized,
                index: None,
                last_error: None,
            }),
            build_lock: Mutex::new(()),
        })
    }
}
