//! Loading source files into [`Document`]s.
//!
//! [`DirectoryLoader`] walks a corpus directory and dispatches each file to
//! the first registered [`DocumentLoader`] that supports its extension. Files
//! that fail to load are collected in [`DirectoryLoad::failures`] rather than
//! aborting the walk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::document::Document;
use crate::error::{RagError, Result};

/// Reads one file into one or more documents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the file at `path`. Each returned document has `source` set to
    /// `path` as given.
    async fn load(&self, path: &Path) -> Result<Vec<Document>>;

    /// Lowercase file extensions this loader handles, without the dot.
    fn supported_extensions(&self) -> &[&str];
}

fn load_error(path: &Path, message: impl Into<String>) -> RagError {
    RagError::LoadError { source_id: path.display().to_string(), message: message.into() }
}

async fn check_size(path: &Path, max_file_size: u64) -> Result<()> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| load_error(path, e.to_string()))?;
    if meta.len() > max_file_size {
        return Err(load_error(
            path,
            format!("file is {} bytes, limit is {max_file_size}", meta.len()),
        ));
    }
    Ok(())
}

/// Loads UTF-8 text and markdown files as a single unpaginated document.
#[derive(Debug, Clone)]
pub struct TextLoader {
    /// Files larger than this many bytes are rejected.
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE }
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        check_size(path, self.max_file_size).await?;

        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some("md" | "markdown") => "text/markdown",
            _ => "text/plain",
        };
        let text =
            tokio::fs::read_to_string(path).await.map_err(|e| load_error(path, e.to_string()))?;

        let mut document = Document::new(path.display().to_string(), text);
        document.metadata.insert("content_type".to_string(), content_type.to_string());
        Ok(vec![document])
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}

/// Loads PDF files as one document per page, with zero-based page numbers.
///
/// Only available with the `pdf` feature.
#[cfg(feature = "pdf")]
#[derive(Debug, Clone)]
pub struct PdfLoader {
    /// Files larger than this many bytes are rejected.
    pub max_file_size: u64,
}

#[cfg(feature = "pdf")]
impl Default for PdfLoader {
    fn default() -> Self {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE }
    }
}

#[cfg(feature = "pdf")]
#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        check_size(path, self.max_file_size).await?;

        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
            .await
            .map_err(|e| load_error(path, format!("pdf extraction task failed: {e}")))?
            .map_err(|e| load_error(path, e.to_string()))?;

        let source = path.display().to_string();
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(page, text)| {
                let mut document = Document::new(source.clone(), text).with_page(page as u32);
                document
                    .metadata
                    .insert("content_type".to_string(), "application/pdf".to_string());
                document
            })
            .collect())
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// The outcome of loading a directory.
#[derive(Debug, Default)]
pub struct DirectoryLoad {
    /// Documents loaded successfully, in path order.
    pub documents: Vec<Document>,
    /// Files that could not be loaded, with the reason.
    pub failures: Vec<(PathBuf, RagError)>,
}

/// Walks a directory tree and loads every supported file.
///
/// Files are visited in sorted path order. Each document's `source` is the
/// file path relative to the walked directory, with `/` separators, so chunk
/// ids do not change when the corpus directory is moved.
///
/// # Example
///
/// ```rust,ignore
/// use docqa::DirectoryLoader;
///
/// let loader = DirectoryLoader::with_defaults(50 * 1024 * 1024);
/// let load = loader.load_dir(Path::new("data")).await?;
/// ```
#[derive(Clone, Default)]
pub struct DirectoryLoader {
    loaders: HashMap<String, Arc<dyn DocumentLoader>>,
}

impl std::fmt::Debug for DirectoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.loaders.keys().collect();
        extensions.sort();
        f.debug_struct("DirectoryLoader").field("extensions", &extensions).finish()
    }
}

impl DirectoryLoader {
    /// Create a loader with no registered file types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader for text and markdown files, plus PDF with the `pdf` feature.
    pub fn with_defaults(max_file_size: u64) -> Self {
        let loader = Self::new().register(Arc::new(TextLoader { max_file_size }));
        #[cfg(feature = "pdf")]
        let loader = loader.register(Arc::new(PdfLoader { max_file_size }));
        loader
    }

    /// Register `loader` for each of its supported extensions, replacing earlier registrations.
    pub fn register(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        for ext in loader.supported_extensions() {
            self.loaders.insert(ext.to_ascii_lowercase(), Arc::clone(&loader));
        }
        self
    }

    fn loader_for(&self, path: &Path) -> Option<&Arc<dyn DocumentLoader>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.loaders.get(&ext)
    }

    /// Load every supported file under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LoadError`] if `root` is not a readable directory.
    /// Failures of individual files are reported in [`DirectoryLoad::failures`].
    pub async fn load_dir(&self, root: &Path) -> Result<DirectoryLoad> {
        if !root.is_dir() {
            return Err(load_error(root, "not a directory"));
        }

        let mut files = Vec::new();
        let mut outcome = DirectoryLoad::default();
        for entry in WalkDir::new(root) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    let path =
                        e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    outcome.failures.push((path.clone(), load_error(&path, e.to_string())));
                }
            }
        }
        files.sort();

        for path in files {
            let Some(loader) = self.loader_for(&path) else {
                debug!(path = %path.display(), "ignoring unsupported file");
                continue;
            };
            match loader.load(&path).await {
                Ok(documents) => {
                    let source = relative_source(root, &path);
                    outcome.documents.extend(documents.into_iter().map(|mut doc| {
                        doc.source = source.clone();
                        doc
                    }));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable document");
                    outcome.failures.push((path, e));
                }
            }
        }

        Ok(outcome)
    }
}

/// `path` relative to `root`, joined with `/`.
fn relative_source(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn text_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, "# Title\nBody").unwrap();

        let docs = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "# Title\nBody");
        assert_eq!(docs[0].page, None);
        assert_eq!(docs[0].metadata["content_type"], "text/markdown");
    }

    #[tokio::test]
    async fn text_loader_rejects_large_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        fs::write(&file, "xx").unwrap();

        let err = TextLoader { max_file_size: 1 }.load(&file).await.unwrap_err();
        assert!(matches!(err, RagError::LoadError { .. }));
        let err = TextLoader::default().load(&dir.path().join("absent.txt")).await.unwrap_err();
        assert!(matches!(err, RagError::LoadError { .. }));
    }

    #[tokio::test]
    async fn directory_loader_walks_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.txt"), "bee").unwrap();
        fs::write(dir.path().join("a.md"), "ay").unwrap();
        fs::write(dir.path().join("nested/c.txt"), "sea").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let load = DirectoryLoader::with_defaults(1024).load_dir(dir.path()).await.unwrap();
        let sources: Vec<&str> = load.documents.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "b.txt", "nested/c.txt"]);
        assert!(load.failures.is_empty());
    }

    #[tokio::test]
    async fn unreadable_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.txt"), "fine").unwrap();
        fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let load = DirectoryLoader::with_defaults(1024).load_dir(dir.path()).await.unwrap();
        assert_eq!(load.documents.len(), 1);
        assert_eq!(load.documents[0].source, "good.txt");
        assert_eq!(load.failures.len(), 1);
        assert!(load.failures[0].0.ends_with("bad.txt"));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryLoader::with_defaults(1024)
            .load_dir(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::LoadError { .. }));
    }

    #[test]
    fn extensions_match_case_insensitively() {
        let loader = DirectoryLoader::with_defaults(1024);
        assert!(loader.loader_for(Path::new("README.MD")).is_some());
        assert!(loader.loader_for(Path::new("archive.zip")).is_none());
        assert!(loader.loader_for(Path::new("Makefile")).is_none());
    }
}
