//! Text extraction from document files.
//!
//! [`FileExtractor`] picks a format by file extension:
//!
//! - `.pdf`: one [`Page`] per physical page (feature `pdf`)
//! - `.docx`: the document body as a single page (feature `docx`)
//! - `.txt` / `.md`: UTF-8 text, with form feeds separating pages

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
#[cfg(feature = "pdf")]
use tracing::warn;

use crate::document::Page;
use crate::error::{RagError, Result};

/// Reads a document file into pages.
///
/// Implementations must yield exactly one [`Page`] per physical page, in
/// order, even when a page has no text.
pub trait TextExtractor: Send + Sync {
    /// Extract the pages of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ExtractionError`] if the file cannot be read or
    /// decoded, or has an unsupported format.
    fn extract(&self, path: &Path) -> Result<Vec<Page>>;

    /// `true` if this extractor understands the file at `path`.
    fn supports(&self, path: &Path) -> bool;
}

/// Dispatches on file extension to the built-in format readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl FileExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }

    /// Lower-case extensions this build can read.
    pub fn supported_extensions() -> &'static [&'static str] {
        &[
            #[cfg(feature = "pdf")]
            "pdf",
            #[cfg(feature = "docx")]
            "docx",
            "txt",
            "md",
        ]
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase)
}

impl TextExtractor for FileExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        let pages = match extension(path).as_deref() {
            #[cfg(feature = "pdf")]
            Some("pdf") => extract_pdf(path)?,
            #[cfg(feature = "docx")]
            Some("docx") => extract_docx(path)?,
            Some("txt" | "md") => extract_plain_text(path)?,
            other => {
                return Err(extraction_error(
                    path,
                    format!("unsupported format: {}", other.unwrap_or("no extension")),
                ));
            }
        };
        debug!(path = %path.display(), page_count = pages.len(), "extracted document");
        Ok(pages)
    }

    fn supports(&self, path: &Path) -> bool {
        extension(path).is_some_and(|ext| Self::supported_extensions().contains(&ext.as_str()))
    }
}

fn extraction_error(path: &Path, err: impl std::fmt::Display) -> RagError {
    RagError::ExtractionError { path: path.to_path_buf(), message: err.to_string() }
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path) -> Result<Vec<Page>> {
    let document = lopdf::Document::load(path).map_err(|e| extraction_error(path, e))?;
    let page_ids = document.get_pages();
    if page_ids.is_empty() {
        return Err(extraction_error(path, "PDF has no pages"));
    }

    let pages = page_ids
        .keys()
        .map(|&number| {
            let text = document.extract_text(&[number]).unwrap_or_else(|e| {
                warn!(path = %path.display(), page = number, error = %e, "page text unreadable");
                String::new()
            });
            Page::new(number, text)
        })
        .collect();
    Ok(pages)
}

#[cfg(feature = "docx")]
fn extract_docx(path: &Path) -> Result<Vec<Page>> {
    use std::io::Read;

    let file = std::fs::File::open(path).map_err(|e| extraction_error(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| extraction_error(path, e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| extraction_error(path, format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| extraction_error(path, e))?;

    let text = docx_body_text(&xml).map_err(|e| extraction_error(path, e))?;
    Ok(vec![Page::new(1, text)])
}

/// Plain text of a WordprocessingML body: one line per paragraph.
#[cfg(feature = "docx")]
fn docx_body_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    text.truncate(text.trim_end().len());
    Ok(text)
}

fn extract_plain_text(path: &Path) -> Result<Vec<Page>> {
    let content = std::fs::read_to_string(path).map_err(|e| extraction_error(path, e))?;
    // pdftotext-style dumps end every page with a form feed
    let content = content.strip_suffix('\x0c').unwrap_or(&content);
    Ok(content
        .split('\x0c')
        .enumerate()
        .map(|(i, text)| Page::new(i as u32 + 1, text))
        .collect())
}

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("unreachable error: failed to compile whitespace pattern")
});

/// Collapse every whitespace run (including newlines) into one space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}
