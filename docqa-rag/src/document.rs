//! Data types for documents, pages, chunks, and search results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single physical page of extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// The extracted text. Empty when the page has no text or could not be decoded.
    pub text: String,
}

impl Page {
    /// Create a page with the given 1-based number and text.
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self { number, text: text.into() }
    }
}

/// A source document: an identity plus its pages in reading order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document within one build.
    pub id: String,
    /// The file the document was read from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    /// Pages in reading order.
    pub pages: Vec<Page>,
}

impl Document {
    /// Create a document with no source path.
    pub fn new(id: impl Into<String>, pages: Vec<Page>) -> Self {
        Self { id: id.into(), source_path: None, pages }
    }

    /// Create a single-page document from a block of text.
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, vec![Page::new(1, text)])
    }

    /// Attach the file the document was read from.
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Total number of characters across all pages.
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }

    /// `true` when no page carries any text.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// A bounded segment of a [`Document`]'s text.
///
/// Chunks are created by a [`Chunker`](crate::Chunker) and never modified
/// afterwards. Offsets and lengths are counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Identifier of the form `{document_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The page containing the chunk's first character.
    pub page_number: u32,
    /// Character offset of the chunk within the concatenated document text.
    pub start_offset: usize,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

/// A [`Chunk`] paired with its vector embedding inside an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Insertion position in the index. Unique within one index.
    pub id: u64,
    /// The vector embedding for the chunk's text.
    pub vector: Vec<f32>,
    /// The embedded chunk.
    pub chunk: Chunk,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// A citation shown to the user next to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    /// The document the excerpt comes from.
    pub document_id: String,
    /// The page the excerpt starts on.
    pub page_number: u32,
    /// The leading characters of the cited chunk.
    pub excerpt: String,
    /// Similarity of the cited chunk to the question.
    pub score: f32,
}

impl Source {
    /// Build a citation from a search result, keeping at most `excerpt_chars` characters.
    pub fn from_result(result: &SearchResult, excerpt_chars: usize) -> Self {
        Self {
            document_id: result.chunk.document_id.clone(),
            page_number: result.chunk.page_number,
            excerpt: result.chunk.text.chars().take(excerpt_chars).collect(),
            score: result.score,
        }
    }
}

/// The answer produced by the synthesizer and the context it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The model's answer text.
    pub text: String,
    /// Exactly the chunks that were placed in the prompt, most similar first.
    pub used_chunks: Vec<SearchResult>,
}

/// The full outcome of a successful query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Everything the retriever returned, most similar first.
    pub retrieved: Vec<SearchResult>,
    /// The synthesized answer.
    pub answer: Answer,
}

/// What the shell receives from [`RagPipeline::query`](crate::RagPipeline::query).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    /// Answer text, or an explanation when the question could not be answered.
    pub answer: String,
    /// Citations for the chunks the answer was grounded on.
    pub sources: Vec<Source>,
}

impl QueryResponse {
    /// A response with an explanatory message and no sources.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self { answer: message.into(), sources: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_is_cut_on_char_boundaries() {
        let result = SearchResult {
            chunk: Chunk {
                id: "d_0".into(),
                text: "ação".repeat(100),
                document_id: "d".into(),
                page_number: 2,
                start_offset: 0,
                chunk_index: 0,
            },
            score: 0.5,
        };
        let source = Source::from_result(&result, 6);
        assert_eq!(source.excerpt, "açãoaç");
        assert_eq!(source.page_number, 2);
    }

    #[test]
    fn blank_document_detection() {
        let doc = Document::new("d", vec![Page::new(1, "  \n"), Page::new(2, "")]);
        assert!(doc.is_blank());
        assert_eq!(doc.char_count(), 3);
    }
}
