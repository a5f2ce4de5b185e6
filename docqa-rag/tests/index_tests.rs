//! Property tests for embedding index builds and search ordering.

use async_trait::async_trait;
use docqa_rag::document::{Chunk, EmbeddingRecord};
use docqa_rag::index::{BuildOptions, EmbeddingIndex, SimilarityMetric};
use docqa_rag::{EmbeddingProvider, Result};
use proptest::prelude::*;

const DIM: usize = 16;

/// Deterministic embedder: hashes the text into a normalized vector.
struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb: Vec<f32> =
            (0..DIM).map(|i| ((hash.wrapping_add(i as u64)) as f32).sin()).collect();
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

fn chunk(i: usize, text: String) -> Chunk {
    Chunk {
        id: format!("doc_{i}"),
        text,
        document_id: "doc".to_string(),
        page_number: 1,
        start_offset: i,
        chunk_index: i,
    }
}

fn arb_chunks() -> impl Strategy<Value = Vec<Chunk>> {
    proptest::collection::vec("[a-z ]{1,30}", 0..40)
        .prop_map(|texts| texts.into_iter().enumerate().map(|(i, t)| chunk(i, t)).collect())
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn build(chunks: Vec<Chunk>, batch_size: usize, concurrency: usize) -> EmbeddingIndex {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(EmbeddingIndex::build(
        chunks,
        &HashEmbedder,
        BuildOptions { batch_size, concurrency, metric: SimilarityMetric::Cosine },
    ))
    .unwrap()
}

mod prop_index_build {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn one_record_per_chunk_in_input_order(
            chunks in arb_chunks(),
            batch_size in 1usize..8,
            concurrency in 1usize..5,
        ) {
            let index = build(chunks.clone(), batch_size, concurrency);

            prop_assert_eq!(index.len(), chunks.len());
            for (i, (record, chunk)) in index.records().iter().zip(&chunks).enumerate() {
                prop_assert_eq!(record.id, i as u64);
                prop_assert_eq!(&record.chunk, chunk);
                prop_assert_eq!(record.vector.len(), DIM);
            }
        }

        #[test]
        fn batching_does_not_change_the_vectors(chunks in arb_chunks(), batch_size in 1usize..8) {
            let batched = build(chunks.clone(), batch_size, 3);
            let single = build(chunks, usize::MAX, 1);
            prop_assert_eq!(batched.records(), single.records());
        }
    }
}

mod prop_index_search {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_are_bounded_ordered_and_drawn_from_the_index(
            chunks in arb_chunks(),
            query in arb_normalized_embedding(DIM),
            k in 1usize..50,
        ) {
            let index = build(chunks, 4, 2);
            let results = index.search(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(index.len()));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
            for result in &results {
                prop_assert!(index.records().iter().any(|r| r.chunk == result.chunk));
            }
            if let Some(best) = results.first() {
                let max = index
                    .records()
                    .iter()
                    .map(|r| SimilarityMetric::Cosine.score(&r.vector, &query))
                    .fold(f32::NEG_INFINITY, f32::max);
                prop_assert_eq!(best.score, max);
            }
        }

        #[test]
        fn equal_scores_keep_insertion_order(n in 1usize..20, k in 1usize..20) {
            let records = (0..n)
                .map(|i| EmbeddingRecord {
                    id: 0,
                    vector: vec![1.0, 0.0],
                    chunk: chunk(i, format!("c{i}")),
                })
                .collect();
            let index = EmbeddingIndex::from_records(SimilarityMetric::Cosine, records).unwrap();

            let results = index.search(&[1.0, 0.0], k).unwrap();
            let order: Vec<usize> = results.iter().map(|r| r.chunk.chunk_index).collect();
            prop_assert_eq!(order, (0..k.min(n)).collect::<Vec<_>>());
        }
    }
}
