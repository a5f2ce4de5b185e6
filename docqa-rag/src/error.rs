//! Error types for the `docqa-rag` crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in retrieval and answering operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document could not be read or decoded. Recoverable: the build
    /// skips the file and reports it.
    #[error("Extraction error ({}): {message}", path.display())]
    ExtractionError {
        /// The file that failed.
        path: PathBuf,
        /// A description of the underlying cause.
        message: String,
    },

    /// An error occurred during embedding generation, or the provider
    /// returned vectors that do not fit the index.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A caller supplied an argument outside its valid range
    /// (`k`, `chunk_size`, `chunk_overlap`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A query was issued before any index was published.
    #[error("the document index has not been initialized")]
    NotInitialized,

    /// The language model call failed or timed out.
    #[error("Synthesis error ({provider}): {message}")]
    SynthesisError {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Saving or loading a persisted index failed.
    #[error("Persistence error ({}): {message}", path.display())]
    PersistenceError {
        /// The index file involved.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// A build attempt failed as a whole.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// A file that was skipped during a build, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    /// The file that could not be extracted.
    pub path: PathBuf,
    /// Why extraction failed.
    pub message: String,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Why a build attempt could not produce an index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildFailure {
    /// The document source supplied nothing to index.
    #[error("no documents found in {0}")]
    NoDocuments(String),

    /// Documents were found but none of them produced any text.
    #[error("no usable documents: every document failed extraction or was empty")]
    NoUsableDocuments,

    /// The embedding provider failed; nothing was indexed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The document source itself could not be read.
    #[error("document source unavailable: {0}")]
    Source(String),
}

/// A failed build: the fatal cause plus every file that was skipped on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    /// The unrecoverable cause.
    pub failure: BuildFailure,
    /// Files skipped before the build gave up.
    pub skipped: Vec<ExtractionFailure>,
}

impl BuildError {
    pub(crate) fn new(failure: BuildFailure, skipped: Vec<ExtractionFailure>) -> Self {
        Self { failure, skipped }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "build failed: {}", self.failure)?;
        for skipped in &self.skipped {
            write!(f, "\n  skipped {skipped}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}
