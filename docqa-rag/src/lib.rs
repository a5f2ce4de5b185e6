//! Question answering over document collections.
//!
//! This crate provides the retrieval core of a document Q&A system:
//! - Text extraction from PDF, DOCX and plain text files, page by page
//! - Fixed-size overlapping chunking with page attribution
//! - An immutable embedding index with batched, concurrent builds
//! - Top-k retrieval and context-bounded answer synthesis
//! - A [`RagPipeline`] that owns the index lifecycle and never fails a query
//!
//! Embedding models and language models plug in through the
//! [`EmbeddingProvider`] and [`CompletionProvider`] traits. OpenAI-backed
//! implementations live in [`openai`] behind the `openai` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{DirectorySource, RagConfig, RagPipeline};
//! use docqa_rag::openai::{OpenAICompletionProvider, OpenAIEmbeddingProvider};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .completion_provider(Arc::new(OpenAICompletionProvider::from_env()?))
//!     .build()?;
//!
//! pipeline.initialize(&DirectorySource::new("documentos")).await?;
//! let response = pipeline.query("Which clause covers termination?").await;
//! for source in &response.sources {
//!     println!("{} p.{}: {}", source.document_id, source.page_number, source.excerpt);
//! }
//! ```

pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod pipeline;
pub mod retriever;
pub mod source;
pub mod synthesis;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, split_pages};
pub use completion::CompletionProvider;
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Answer, Chunk, Document, EmbeddingRecord, Page, QueryResponse, QueryResult, SearchResult,
    Source,
};
pub use embedding::EmbeddingProvider;
pub use error::{BuildError, BuildFailure, ExtractionFailure, RagError, Result};
pub use extract::{FileExtractor, TextExtractor, normalize_whitespace};
pub use index::{BuildOptions, EmbeddingIndex, SimilarityMetric};
pub use pipeline::{
    BuildReport, NOT_INITIALIZED_ANSWER, PipelineState, ProgressCallback, ProgressEvent,
    QUERY_FAILED_ANSWER, RagPipeline, RagPipelineBuilder,
};
pub use retriever::{DEFAULT_TOP_K, Retriever};
pub use source::{DirectorySource, DocumentSource, FileListSource, InMemorySource, LoadedDocuments};
pub use synthesis::{AnswerSynthesizer, DEFAULT_PROMPT_TEMPLATE};
