//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`FixedSizeChunker`], which
//! slides a fixed-size character window over the concatenated page text of a
//! document while remembering which page each window starts on.

use crate::document::{Chunk, Document, Page};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks in reading order.
    ///
    /// Returns an empty `Vec` if the document has no text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Page texts are concatenated into one stream. Windows of `chunk_size`
/// characters advance by `chunk_size - chunk_overlap`; the window that reaches
/// the end of the stream is the last one and may be shorter. A chunk's
/// `page_number` is the page holding its first character.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(4, 1).unwrap();
/// let chunks = chunker.chunk(&Document::from_text("doc", "abcdefghij"));
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["abcd", "defg", "ghij"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        sliding_windows(&document.id, &document.pages, self.chunk_size, self.chunk_overlap)
    }
}

/// Split pages into overlapping chunks attributed to `document_id`.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] unless `chunk_size > 0` and
/// `chunk_overlap < chunk_size`. Empty input is not an error.
pub fn split_pages(
    document_id: &str,
    pages: &[Page],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate(chunk_size, chunk_overlap)?;
    Ok(sliding_windows(document_id, pages, chunk_size, chunk_overlap))
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidArgument("chunk_size must be greater than zero".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidArgument(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Concatenated page text with the character offset where each non-empty page starts.
struct PageStream {
    text: String,
    /// Byte position of every character, plus `text.len()` as a sentinel.
    byte_offsets: Vec<usize>,
    /// `(start_char, page_number)` for every non-empty page, ascending.
    page_starts: Vec<(usize, u32)>,
}

impl PageStream {
    fn new(pages: &[Page]) -> Self {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        let mut offset = 0;
        for page in pages {
            let len = page.text.chars().count();
            if len == 0 {
                continue;
            }
            page_starts.push((offset, page.number));
            text.push_str(&page.text);
            offset += len;
        }
        let byte_offsets =
            text.char_indices().map(|(b, _)| b).chain(std::iter::once(text.len())).collect();
        Self { text, byte_offsets, page_starts }
    }

    fn char_len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.text[self.byte_offsets[start]..self.byte_offsets[end]]
    }

    fn page_at(&self, offset: usize) -> u32 {
        let idx = self.page_starts.partition_point(|(start, _)| *start <= offset);
        // the first page always starts at offset 0, so idx >= 1
        self.page_starts[idx.saturating_sub(1)].1
    }
}

fn sliding_windows(
    document_id: &str,
    pages: &[Page],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let stream = PageStream::new(pages);
    let total = stream.char_len();
    if total == 0 {
        return Vec::new();
    }

    let step = chunk_size - chunk_overlap;
    let mut chunks = Vec::with_capacity(total.div_ceil(step));
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(total);
        let chunk_index = chunks.len();
        chunks.push(Chunk {
            id: format!("{document_id}_{chunk_index}"),
            text: stream.slice(start, end).to_string(),
            document_id: document_id.to_string(),
            page_number: stream.page_at(start),
            start_offset: start,
            chunk_index,
        });
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}
