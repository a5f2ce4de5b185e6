//! Ask questions over a document folder without any API key.
//!
//! Uses a word-hashing embedder and an extractive "model" that answers with
//! the best-matching context sentence.
//!
//! Run with:
//! ```sh
//! cargo run -p docqa-demos --example ask_mock -- ./documentos "What is the notice period?"
//! ```
//!
//! Without a folder argument a small built-in document set is used.

use std::sync::Arc;

use async_trait::async_trait;
use docqa_demos::{HashingEmbedder, init_tracing, print_progress};
use docqa_rag::{
    CompletionProvider, DirectorySource, Document, DocumentSource, InMemorySource, Page,
    RagConfig, RagPipeline,
};

/// Answers with the first sentence of the context block.
struct ExtractiveModel;

#[async_trait]
impl CompletionProvider for ExtractiveModel {
    async fn complete(&self, prompt: &str) -> docqa_rag::Result<String> {
        let context = prompt
            .split_once("Context:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nQuestion:"))
            .map(|(context, _)| context.trim())
            .unwrap_or_default();
        if context.is_empty() {
            return Ok("I do not know.".to_string());
        }
        let sentence = context.split_inclusive(". ").next().unwrap_or(context);
        Ok(sentence.trim().to_string())
    }

    fn name(&self) -> &str {
        "extractive"
    }
}

fn sample_documents() -> InMemorySource {
    InMemorySource::new(vec![
        Document::new(
            "lease.pdf",
            vec![
                Page::new(
                    1,
                    "The tenant pays rent on the first day of each month by bank transfer.",
                ),
                Page::new(
                    2,
                    "Either party may terminate the lease. \
                     The notice period for termination is thirty days.",
                ),
            ],
        ),
        Document::from_text(
            "handbook.txt",
            "Employees accrue two vacation days per month. Overtime is paid at double rate.",
        ),
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let folder = args.next();
    let questions: Vec<String> = args.collect();
    let questions = if questions.is_empty() {
        vec!["What is the notice period?".to_string(), "How is overtime paid?".to_string()]
    } else {
        questions
    };

    let config = RagConfig::builder().chunk_size(120).chunk_overlap(20).top_k(3).build()?;
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbedder::new(256)))
        .completion_provider(Arc::new(ExtractiveModel))
        .on_progress(Arc::new(print_progress))
        .build()?;

    let source: Box<dyn DocumentSource> = match folder {
        Some(folder) => Box::new(DirectorySource::new(folder)),
        None => Box::new(sample_documents()),
    };
    let report = pipeline.initialize(source.as_ref()).await?;
    println!("Indexed {} chunk(s) from {}", report.chunk_count, report.source);

    for question in &questions {
        let response = pipeline.query(question).await;
        println!("\nQ: {question}\nA: {}", response.answer);
        for source in &response.sources {
            println!(
                "   [{:.3}] {} p.{}: {}",
                source.score, source.document_id, source.page_number, source.excerpt
            );
        }
    }

    Ok(())
}
