//! Exact nearest-neighbor index over chunk embeddings.
//!
//! [`EmbeddingIndex`] is built in one pass from a list of chunks and never
//! mutated afterwards. Rebuilding means constructing a new index and swapping
//! it in, which the [`RagPipeline`](crate::RagPipeline) does behind a lock.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::{Chunk, EmbeddingRecord, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Version written into persisted index files.
const INDEX_FORMAT_VERSION: u32 = 1;

/// How vectors are compared. Higher scores always mean more similar.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine similarity in `[-1, 1]`. Zero vectors score 0.
    #[default]
    Cosine,
    /// Negated Euclidean distance, so the closest vector scores highest.
    L2,
}

impl SimilarityMetric {
    /// Score `candidate` against `query`.
    pub fn score(self, candidate: &[f32], query: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(candidate, query),
            Self::L2 => -euclidean_distance(candidate, query),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Batching parameters for [`EmbeddingIndex::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Chunk texts per embedding request.
    pub batch_size: usize,
    /// Embedding requests allowed in flight at once.
    pub concurrency: usize,
    /// Metric the finished index searches with.
    pub metric: SimilarityMetric,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { batch_size: 64, concurrency: 4, metric: SimilarityMetric::Cosine }
    }
}

impl From<&RagConfig> for BuildOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            batch_size: config.embed_batch_size,
            concurrency: config.embed_concurrency,
            metric: config.metric,
        }
    }
}

/// An immutable set of [`EmbeddingRecord`]s supporting exact similarity search.
///
/// Records keep the order of the chunks they were built from; that order is
/// the tie-break when two chunks score the same.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{BuildOptions, EmbeddingIndex};
///
/// let index = EmbeddingIndex::build(chunks, &embedder, BuildOptions::default()).await?;
/// let hits = index.search(&embedder.embed("question").await?, 3)?;
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    metric: SimilarityMetric,
    dimensions: usize,
    records: Vec<EmbeddingRecord>,
    built_at: DateTime<Utc>,
}

impl EmbeddingIndex {
    /// Embed `chunks` and index them.
    ///
    /// See [`build_with_progress`](Self::build_with_progress).
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        options: BuildOptions,
    ) -> Result<Self> {
        Self::build_with_progress(chunks, provider, options, &|_, _| {}).await
    }

    /// Embed `chunks` in batches and index them, calling `on_batch(done, total)`
    /// after each batch completes.
    ///
    /// Batches may complete in any order; each response is matched to its
    /// chunks by batch position. The result holds exactly one record per
    /// chunk, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for a zero batch size or
    /// concurrency, and [`RagError::EmbeddingError`] if any request fails,
    /// returns the wrong number of vectors, or returns a vector whose
    /// dimension differs from the provider's. No index is produced then.
    pub async fn build_with_progress(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        options: BuildOptions,
        on_batch: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<Self> {
        if options.batch_size == 0 || options.concurrency == 0 {
            return Err(RagError::InvalidArgument(
                "embedding batch size and concurrency must be greater than zero".into(),
            ));
        }

        let provider_name = provider.name().to_string();
        let declared = provider.dimensions();
        let batches: Vec<&[Chunk]> = chunks.chunks(options.batch_size).collect();
        let total = batches.len();
        debug!(
            provider = %provider_name,
            chunk_count = chunks.len(),
            batch_count = total,
            concurrency = options.concurrency,
            "embedding chunks"
        );

        let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; total];
        let mut dimensions = (declared > 0).then_some(declared);
        let mut completed = 0;

        let mut responses = futures::stream::iter(batches.iter().copied().enumerate())
            .map(|(position, batch)| async move {
                let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
                (position, provider.embed_batch(&texts).await)
            })
            .buffer_unordered(options.concurrency);

        while let Some((position, response)) = responses.next().await {
            let batch = batches[position];
            let vectors = response.map_err(|e| {
                error!(
                    provider = %provider_name,
                    batch = position,
                    error = %e,
                    "embedding batch failed"
                );
                as_embedding_error(&provider_name, e)
            })?;

            if vectors.len() != batch.len() {
                error!(provider = %provider_name, batch = position, "embedding count mismatch");
                return Err(RagError::EmbeddingError {
                    provider: provider_name,
                    message: format!(
                        "batch {position} returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    ),
                });
            }

            for (chunk, vector) in batch.iter().zip(&vectors) {
                let expected = *dimensions.get_or_insert(vector.len());
                if vector.is_empty() || vector.len() != expected {
                    error!(
                        provider = %provider_name,
                        chunk.id = %chunk.id,
                        expected,
                        actual = vector.len(),
                        "embedding dimension mismatch"
                    );
                    return Err(RagError::EmbeddingError {
                        provider: provider_name,
                        message: format!(
                            "chunk '{}' embedded with dimension {}, expected {expected}",
                            chunk.id,
                            vector.len()
                        ),
                    });
                }
            }

            slots[position] = Some(vectors);
            completed += 1;
            on_batch(completed, total);
        }
        drop(responses);

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(slots.into_iter().flatten().flatten())
            .enumerate()
            .map(|(id, (chunk, vector))| EmbeddingRecord { id: id as u64, vector, chunk })
            .collect();

        let index = Self {
            metric: options.metric,
            dimensions: dimensions.unwrap_or(declared),
            records,
            built_at: Utc::now(),
        };
        info!(record_count = index.len(), dimensions = index.dimensions, "built embedding index");
        Ok(index)
    }

    /// Assemble an index from records that already carry vectors.
    ///
    /// Records are re-numbered in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the records disagree on dimension.
    pub fn from_records(metric: SimilarityMetric, records: Vec<EmbeddingRecord>) -> Result<Self> {
        let dimensions = records.first().map_or(0, |r| r.vector.len());
        let malformed = |r: &&EmbeddingRecord| r.vector.is_empty() || r.vector.len() != dimensions;
        if let Some(bad) = records.iter().find(malformed) {
            return Err(RagError::EmbeddingError {
                provider: "index".into(),
                message: format!(
                    "record for chunk '{}' has dimension {}, expected {dimensions}",
                    bad.chunk.id,
                    bad.vector.len()
                ),
            });
        }
        let records = records
            .into_iter()
            .enumerate()
            .map(|(id, record)| EmbeddingRecord { id: id as u64, ..record })
            .collect();
        Ok(Self { metric, dimensions, records, built_at: Utc::now() })
    }

    /// Return the `k` records most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. Returns fewer than `k` results when
    /// the index holds fewer records.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `k == 0` and
    /// [`RagError::EmbeddingError`] if `query` has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".into()));
        }
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(RagError::EmbeddingError {
                provider: "index".into(),
                message: format!(
                    "query has dimension {}, index has dimension {}",
                    query.len(),
                    self.dimensions
                ),
            });
        }

        let mut scored: Vec<(f32, &EmbeddingRecord)> = self
            .records
            .iter()
            .map(|record| {
                let score = self.metric.score(&record.vector, query);
                (if score.is_nan() { f32::NEG_INFINITY } else { score }, record)
            })
            .collect();

        // stable: equal scores stay in insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchResult { chunk: record.chunk.clone(), score })
            .collect())
    }

    /// Number of records in the index.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimension shared by every record.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The metric used by [`search`](Self::search).
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    /// When the index was built or assembled.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Write the index to `path` as JSON.
    ///
    /// The file is written next to `path` first and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] on any I/O or encoding failure.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let persisted = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            metric: self.metric,
            dimensions: self.dimensions,
            built_at: self.built_at,
            records: self.records.iter().map(PersistedRecord::from).collect(),
        };

        let tmp = path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &persisted)?;
            writer.flush()?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to save index");
            persistence_error(path, e)
        })?;

        info!(path = %path.display(), record_count = self.len(), "saved embedding index");
        Ok(())
    }

    /// Read an index previously written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if the file cannot be read,
    /// has an unknown format version, or holds inconsistent records.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| persistence_error(path, e))?;
        let persisted: PersistedIndex = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| persistence_error(path, e))?;

        if persisted.version != INDEX_FORMAT_VERSION {
            return Err(persistence_error(
                path,
                format!("unsupported index format version {}", persisted.version),
            ));
        }

        let mut records = Vec::with_capacity(persisted.records.len());
        for (position, record) in persisted.records.into_iter().enumerate() {
            if record.id != position as u64 {
                return Err(persistence_error(
                    path,
                    format!(
                        "record {position} has id {}; records must be stored in order",
                        record.id
                    ),
                ));
            }
            if record.vector.len() != persisted.dimensions {
                return Err(persistence_error(
                    path,
                    format!(
                        "record {position} has dimension {}, index declares {}",
                        record.vector.len(),
                        persisted.dimensions
                    ),
                ));
            }
            records.push(EmbeddingRecord::from(record));
        }

        info!(path = %path.display(), record_count = records.len(), "loaded embedding index");
        Ok(Self {
            metric: persisted.metric,
            dimensions: persisted.dimensions,
            records,
            built_at: persisted.built_at,
        })
    }
}

fn as_embedding_error(provider: &str, err: RagError) -> RagError {
    match err {
        err @ RagError::EmbeddingError { .. } => err,
        other => RagError::EmbeddingError {
            provider: provider.to_string(),
            message: other.to_string(),
        },
    }
}

fn persistence_error(path: &Path, err: impl std::fmt::Display) -> RagError {
    RagError::PersistenceError { path: path.to_path_buf(), message: err.to_string() }
}

// ── On-disk format ─────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    metric: SimilarityMetric,
    dimensions: usize,
    built_at: DateTime<Utc>,
    records: Vec<PersistedRecord>,
}

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    id: u64,
    chunk_id: String,
    document_id: String,
    page_number: u32,
    start_offset: usize,
    chunk_index: usize,
    chunk_text: String,
    vector: Vec<f32>,
}

impl From<&EmbeddingRecord> for PersistedRecord {
    fn from(record: &EmbeddingRecord) -> Self {
        let chunk = &record.chunk;
        Self {
            id: record.id,
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            page_number: chunk.page_number,
            start_offset: chunk.start_offset,
            chunk_index: chunk.chunk_index,
            chunk_text: chunk.text.clone(),
            vector: record.vector.clone(),
        }
    }
}

impl From<PersistedRecord> for EmbeddingRecord {
    fn from(record: PersistedRecord) -> Self {
        Self {
            id: record.id,
            vector: record.vector,
            chunk: Chunk {
                id: record.chunk_id,
                text: record.chunk_text,
                document_id: record.document_id,
                page_number: record.page_number,
                start_offset: record.start_offset,
                chunk_index: record.chunk_index,
            },
        }
    }
}
