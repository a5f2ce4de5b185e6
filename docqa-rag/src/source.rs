//! Document sources supplied to [`RagPipeline::initialize`](crate::RagPipeline::initialize).
//!
//! A source hands the pipeline every document for one build, plus the files
//! it had to skip. Extraction failures are reported, never fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{ExtractionFailure, RagError, Result};
use crate::extract::{FileExtractor, TextExtractor};

/// The documents produced by one [`DocumentSource::load`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedDocuments {
    /// Successfully extracted documents, sorted by ID.
    pub documents: Vec<Document>,
    /// Files that could not be extracted.
    pub failures: Vec<ExtractionFailure>,
}

/// A provider of zero or more documents for one build.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Human-readable description used in build reports, e.g. the directory path.
    fn describe(&self) -> String;

    /// Load every document this source currently provides.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source as a whole is unavailable (for
    /// example a missing directory). Per-file problems go into
    /// [`LoadedDocuments::failures`].
    async fn load(&self) -> Result<LoadedDocuments>;
}

/// Documents read from the supported files of a directory.
///
/// Only the top level is scanned unless [`recursive`](Self::recursive) is set.
/// Document IDs are paths relative to the root, using `/` separators.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::DirectorySource;
///
/// let source = DirectorySource::new("documentos");
/// let report = pipeline.initialize(&source).await?;
/// ```
pub struct DirectorySource {
    root: PathBuf,
    extractor: Arc<dyn TextExtractor>,
    recursive: bool,
}

impl DirectorySource {
    /// Read documents from `root` with the built-in [`FileExtractor`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), extractor: Arc::new(FileExtractor::new()), recursive: false }
    }

    /// Use a different extractor. Files it does not support are ignored.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Descend into subdirectories.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// List the files that would be extracted, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ExtractionError`] if the root is missing or not a directory.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        self.walk().map(|(files, _)| files)
    }

    /// Walk the root, following symlinks. Entries that cannot be read come
    /// back as failures.
    fn walk(&self) -> Result<(Vec<PathBuf>, Vec<ExtractionFailure>)> {
        if !self.root.is_dir() {
            return Err(RagError::ExtractionError {
                path: self.root.clone(),
                message: "document directory not found".into(),
            });
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        let mut failures = Vec::new();
        for entry in WalkDir::new(&self.root).max_depth(max_depth).follow_links(true) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.extractor.supports(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    failures.push(ExtractionFailure { path, message: e.to_string() });
                }
            }
        }

        files.sort();
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok((files, failures))
    }

    fn document_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn load(&self) -> Result<LoadedDocuments> {
        let (files, walk_failures) = self.walk()?;
        info!(root = %self.root.display(), file_count = files.len(), "discovered documents");
        let ids = files.iter().map(|path| self.document_id(path)).collect();
        let mut loaded = extract_all(files, ids, &self.extractor).await;
        loaded.failures.splice(0..0, walk_failures);
        Ok(loaded)
    }
}

/// An explicit list of files, such as a set of uploads.
///
/// Document IDs are the file names. Unsupported files are reported as failures.
pub struct FileListSource {
    files: Vec<PathBuf>,
    extractor: Arc<dyn TextExtractor>,
}

impl FileListSource {
    /// Read the given files with the built-in [`FileExtractor`].
    pub fn new(files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            extractor: Arc::new(FileExtractor::new()),
        }
    }

    /// Use a different extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

#[async_trait]
impl DocumentSource for FileListSource {
    fn describe(&self) -> String {
        format!("{} selected file(s)", self.files.len())
    }

    async fn load(&self) -> Result<LoadedDocuments> {
        let ids = self
            .files
            .iter()
            .map(|path| match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => path.display().to_string(),
            })
            .collect();
        Ok(extract_all(self.files.clone(), ids, &self.extractor).await)
    }
}

/// Documents the caller already holds in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    documents: Vec<Document>,
}

impl InMemorySource {
    /// Serve the given documents.
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    fn describe(&self) -> String {
        "in-memory document set".to_string()
    }

    async fn load(&self) -> Result<LoadedDocuments> {
        let mut documents = self.documents.clone();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(LoadedDocuments { documents, failures: Vec::new() })
    }
}

/// Extract every file on the blocking pool, one task per file.
async fn extract_all(
    files: Vec<PathBuf>,
    ids: Vec<String>,
    extractor: &Arc<dyn TextExtractor>,
) -> LoadedDocuments {
    let tasks: Vec<_> = files
        .into_iter()
        .zip(ids)
        .map(|(path, id)| {
            let extractor = Arc::clone(extractor);
            let task_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || extractor.extract(&task_path));
            (path, id, handle)
        })
        .collect();

    let mut loaded = LoadedDocuments::default();
    for (path, id, handle) in tasks {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(RagError::ExtractionError {
                path: path.clone(),
                message: format!("extraction task failed: {e}"),
            }),
        };

        match outcome {
            Ok(pages) => {
                loaded.documents.push(Document::new(id, pages).with_source_path(path));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping document");
                let message = match e {
                    RagError::ExtractionError { message, .. } => message,
                    other => other.to_string(),
                };
                loaded.failures.push(ExtractionFailure { path, message });
            }
        }
    }

    loaded.documents.sort_by(|a, b| a.id.cmp(&b.id));
    loaded
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn directory_source_skips_bad_files_and_ignores_unsupported_ones() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("b.txt"), "beta").unwrap();
        fs::write(root.join("a.md"), "alpha").unwrap();
        fs::write(root.join("latin1.txt"), [0xff, 0xfe, 0x41]).unwrap();
        fs::write(root.join("table.csv"), "x,y").unwrap();
        fs::create_dir(root.join("nested")).unwrap();
        fs::write(root.join("nested/c.txt"), "gamma").unwrap();

        let loaded = DirectorySource::new(root).load().await.unwrap();

        let ids: Vec<&str> = loaded.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a.md", "b.txt"]);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].path, root.join("latin1.txt"));
        assert_eq!(loaded.documents[1].pages.len(), 1);
        assert_eq!(loaded.documents[1].source_path.as_deref(), Some(root.join("b.txt").as_path()));
    }

    #[tokio::test]
    async fn recursive_directory_ids_are_relative_paths() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("contracts/2024")).unwrap();
        fs::write(root.join("contracts/2024/lease.txt"), "term").unwrap();

        let loaded = DirectorySource::new(root).recursive(true).load().await.unwrap();
        assert_eq!(loaded.documents[0].id, "contracts/2024/lease.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_entries_are_reported_as_failures() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("ok.txt"), "fine").unwrap();
        std::os::unix::fs::symlink(root.join("gone.txt"), root.join("dangling.txt")).unwrap();

        let loaded = DirectorySource::new(root).load().await.unwrap();

        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].id, "ok.txt");
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].path, root.join("dangling.txt"));
        assert_eq!(DirectorySource::new(root).discover().unwrap(), vec![root.join("ok.txt")]);
    }

    #[tokio::test]
    async fn missing_directory_is_a_source_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = DirectorySource::new(temp.path().join("documentos")).load().await.unwrap_err();
        assert!(matches!(err, RagError::ExtractionError { .. }));
    }

    #[tokio::test]
    async fn empty_directory_loads_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let loaded = DirectorySource::new(temp.path()).load().await.unwrap();
        assert_eq!(loaded, LoadedDocuments::default());
    }

    #[tokio::test]
    async fn file_list_reports_unsupported_files() {
        let temp = tempfile::tempdir().unwrap();
        let good = temp.path().join("upload.txt");
        let bad = temp.path().join("upload.xlsx");
        fs::write(&good, "content").unwrap();
        fs::write(&bad, "content").unwrap();

        let loaded = FileListSource::new([&bad, &good]).load().await.unwrap();
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].id, "upload.txt");
        assert_eq!(loaded.failures[0].path, bad);
        assert!(loaded.failures[0].message.contains("unsupported"));
    }

    #[cfg(feature = "pdf")]
    #[tokio::test]
    async fn corrupt_pdf_is_reported_not_fatal() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("broken.pdf"), b"%PDF-garbage").unwrap();
        fs::write(temp.path().join("ok.txt"), "fine").unwrap();

        let loaded = DirectorySource::new(temp.path()).load().await.unwrap();
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.failures.len(), 1);
        assert!(loaded.failures[0].path.ends_with("broken.pdf"));
    }
}
