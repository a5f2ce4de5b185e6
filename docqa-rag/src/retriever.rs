//! Query-time retrieval: embed the question, search the index.

use std::sync::Arc;

use tracing::{debug, error};

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::EmbeddingIndex;

/// Default number of chunks returned per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Finds the chunks most similar to a question.
///
/// The retriever must share its [`EmbeddingProvider`] with the build that
/// produced the index it searches.
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    similarity_threshold: Option<f32>,
}

impl Retriever {
    /// Create a retriever that embeds questions with `embedding_provider`.
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedding_provider, similarity_threshold: None }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Return up to `k` chunks of `index` most similar to `question`, best first.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotInitialized`] if `index` is `None` or empty
    /// - [`RagError::InvalidArgument`] if `k == 0`
    /// - [`RagError::EmbeddingError`] if the question cannot be embedded or
    ///   its vector does not match the index dimension
    pub async fn retrieve(
        &self,
        index: Option<&EmbeddingIndex>,
        question: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = index.filter(|i| !i.is_empty()).ok_or(RagError::NotInitialized)?;
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".into()));
        }

        let query_embedding = self.embedding_provider.embed(question).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            match e {
                e @ RagError::EmbeddingError { .. } => e,
                other => RagError::EmbeddingError {
                    provider: self.embedding_provider.name().to_string(),
                    message: format!("query embedding failed: {other}"),
                },
            }
        })?;

        let mut results = index.search(&query_embedding, k)?;
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }

        debug!(result_count = results.len(), k, "retrieved chunks");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::{Chunk, EmbeddingRecord};
    use crate::index::SimilarityMetric;

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(match text {
                "x" => vec![1.0, 0.0],
                "y" => vec![0.0, 1.0],
                _ => vec![0.0, 0.0, 1.0],
            })
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn index() -> EmbeddingIndex {
        let record = |id: &str, vector: Vec<f32>| EmbeddingRecord {
            id: 0,
            vector,
            chunk: Chunk {
                id: id.into(),
                text: id.into(),
                document_id: "doc".into(),
                page_number: 1,
                start_offset: 0,
                chunk_index: 0,
            },
        };
        EmbeddingIndex::from_records(
            SimilarityMetric::Cosine,
            vec![
                record("east", vec![1.0, 0.0]),
                record("north", vec![0.0, 1.0]),
                record("north_east", vec![1.0, 1.0]),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn retrieves_most_similar_first() {
        let retriever = Retriever::new(Arc::new(AxisEmbedder));
        let results = retriever.retrieve(Some(&index()), "x", DEFAULT_TOP_K).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, ["east", "north_east", "north"]);
    }

    #[tokio::test]
    async fn threshold_filters_weak_matches() {
        let retriever = Retriever::new(Arc::new(AxisEmbedder)).with_similarity_threshold(Some(0.5));
        let results = retriever.retrieve(Some(&index()), "y", 3).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn missing_or_empty_index_is_not_initialized() {
        let retriever = Retriever::new(Arc::new(AxisEmbedder));
        let empty = EmbeddingIndex::from_records(SimilarityMetric::Cosine, vec![]).unwrap();

        assert!(matches!(retriever.retrieve(None, "x", 3).await, Err(RagError::NotInitialized)));
        assert!(matches!(
            retriever.retrieve(Some(&empty), "x", 3).await,
            Err(RagError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn foreign_embedding_space_is_rejected() {
        let retriever = Retriever::new(Arc::new(AxisEmbedder));
        let err = retriever.retrieve(Some(&index()), "z", 3).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingError { .. }));
    }
}
