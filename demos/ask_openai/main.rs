//! Question answering over a folder of PDFs with OpenAI models.
//!
//! Reads `OPENAI_API_KEY` (a `.env` file is honored). The index is cached in
//! `<folder>/.docqa-index.json` and reused on the next run unless `--rebuild`
//! is passed.
//!
//! Run with:
//! ```sh
//! cargo run -p docqa-demos --example ask_openai --features openai -- ./documentos
//! ```
//!
//! Questions are read from stdin, one per line.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use docqa_demos::{init_tracing, print_progress};
use docqa_rag::openai::{OpenAICompletionProvider, OpenAIEmbeddingProvider};
use docqa_rag::{DirectorySource, RagConfig, RagPipeline};
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let rebuild = args.iter().any(|a| a == "--rebuild");
    let folder = args.iter().find(|a| !a.starts_with("--")).map_or("documentos", String::as_str);
    let folder = PathBuf::from(folder);
    let cache = folder.join(".docqa-index.json");

    let pipeline = RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
        .completion_provider(Arc::new(OpenAICompletionProvider::from_env()?))
        .on_progress(Arc::new(print_progress))
        .build()?;

    let cached = if rebuild || !cache.exists() {
        false
    } else {
        match pipeline.load_index(&cache).await {
            Ok(count) => {
                println!("Loaded {count} chunk(s) from {}", cache.display());
                true
            }
            Err(e) => {
                warn!(error = %e, "cached index unusable, rebuilding");
                false
            }
        }
    };
    if !cached {
        pipeline.initialize(&DirectorySource::new(&folder).recursive(true)).await?;
        pipeline.save_index(&cache).await?;
    }

    let stdin = std::io::stdin();
    print!("> ");
    std::io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let question = line?;
        if !question.trim().is_empty() {
            let response = pipeline.query(&question).await;
            println!("{}", response.answer);
            for source in &response.sources {
                println!(
                    "  - {} (page {}): {}",
                    source.document_id, source.page_number, source.excerpt
                );
            }
        }
        print!("> ");
        std::io::stdout().flush()?;
    }

    Ok(())
}
