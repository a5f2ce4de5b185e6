//! Shared helpers for the docqa demos.

use async_trait::async_trait;
use docqa_rag::{EmbeddingProvider, ProgressEvent, Result};
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber honoring `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Print build progress the way a status line would show it.
pub fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::LoadingDocuments { source } => {
            println!("Loading documents from {source}...");
        }
        ProgressEvent::DocumentSkipped { path, message } => {
            println!("  skipped {}: {message}", path.display());
        }
        ProgressEvent::DocumentsLoaded { loaded, skipped } => {
            println!("  {loaded} document(s) loaded, {skipped} skipped");
        }
        ProgressEvent::Chunked { documents, chunks } => {
            println!("  {documents} document(s) → {chunks} chunk(s)");
        }
        ProgressEvent::Embedding { completed_batches, total_batches } => {
            println!("  embedded batch {completed_batches}/{total_batches}");
        }
        ProgressEvent::Ready { chunks } => println!("Ready: {chunks} chunk(s) indexed"),
        ProgressEvent::Failed { message } => println!("Build failed: {message}"),
    }
}

/// Deterministic embedder for running without an API key.
///
/// Each word is hashed into one of `dimensions` buckets, so texts sharing
/// words end up close under cosine similarity.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of length `dimensions`.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
