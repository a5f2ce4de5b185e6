//! Configuration for the RAG pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::SimilarityMetric;
use crate::synthesis::DEFAULT_PROMPT_TEMPLATE;

/// Configuration parameters for the RAG pipeline.
///
/// Deserializing fills missing fields from [`RagConfig::default`], but only
/// [`RagConfigBuilder::build`] and [`RagConfig::validate`] check consistency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results. `None` keeps everything.
    pub similarity_threshold: Option<f32>,
    /// Similarity metric used by the index.
    pub metric: SimilarityMetric,
    /// Number of chunk texts sent to the embedding provider per request.
    pub embed_batch_size: usize,
    /// Maximum number of embedding requests in flight during a build.
    pub embed_concurrency: usize,
    /// Upper bound on the characters of chunk text placed in a prompt.
    pub max_context_chars: usize,
    /// Seconds to wait for the language model before giving up.
    pub completion_timeout_secs: u64,
    /// Number of characters of each cited chunk returned as an excerpt.
    pub excerpt_chars: usize,
    /// Collapse whitespace runs in extracted text before chunking.
    pub normalize_whitespace: bool,
    /// Prompt template with `{context}` and `{question}` placeholders.
    pub prompt_template: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 3,
            similarity_threshold: None,
            metric: SimilarityMetric::Cosine,
            embed_batch_size: 64,
            embed_concurrency: 4,
            max_context_chars: 6000,
            completion_timeout_secs: 60,
            excerpt_chars: 200,
            normalize_whitespace: false,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The language model timeout as a [`Duration`].
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for chunking or `top_k` values
    /// out of range, and [`RagError::ConfigError`] for everything else.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidArgument("chunk_size must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidArgument(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be greater than zero".into()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError("embed_batch_size must be greater than zero".into()));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embed_concurrency must be greater than zero".into(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::ConfigError(
                "max_context_chars must be greater than zero".into(),
            ));
        }
        if self.max_context_chars < self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "max_context_chars ({}) must be at least chunk_size ({})",
                self.max_context_chars, self.chunk_size
            )));
        }
        if self.completion_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "completion_timeout_secs must be greater than zero".into(),
            ));
        }
        for placeholder in ["{context}", "{question}"] {
            if !self.prompt_template.contains(placeholder) {
                return Err(RagError::ConfigError(format!(
                    "prompt_template must contain the {placeholder} placeholder"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the similarity metric.
    pub fn metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set how many chunk texts go into one embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many embedding requests may run at once.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Set the maximum number of context characters placed in a prompt.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the language model timeout.
    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.config.completion_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the citation excerpt length in characters.
    pub fn excerpt_chars(mut self, chars: usize) -> Self {
        self.config.excerpt_chars = chars;
        self
    }

    /// Collapse whitespace in extracted text before chunking.
    pub fn normalize_whitespace(mut self, enabled: bool) -> Self {
        self.config.normalize_whitespace = enabled;
        self
    }

    /// Replace the prompt template.
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = template.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
