//! Loading source documents from a local directory.
//!
//! [`DocumentLoader`] discovers `.pdf` files directly inside a directory and
//! extracts their text page by page through a [`PageExtractor`]. A file that
//! cannot be read is skipped and reported; it never aborts the whole load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{Page, RawDocument};
use crate::error::{RagError, Result};

/// Extracts per-page text from one file.
pub trait PageExtractor: Send + Sync {
    /// Return the text of every page, in page order.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// A [`PageExtractor`] backed by the `pdf-extract` crate.
///
/// The parser is run under `catch_unwind`: malformed PDFs are known to make
/// it panic, and a panic must only cost the one file.
#[cfg(feature = "pdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfPageExtractor;

#[cfg(feature = "pdf")]
impl PageExtractor for PdfPageExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let file = file_name(path);
        let bytes = std::fs::read(path)
            .map_err(|e| RagError::IngestError { file: file.clone(), message: e.to_string() })?;

        match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes)) {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(RagError::IngestError { file, message: e.to_string() }),
            Err(_) => Err(RagError::IngestError { file, message: "PDF parser panicked".into() }),
        }
    }
}

/// A file that was discovered but could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    /// The file name.
    pub file: String,
    /// Why it was skipped.
    pub reason: String,
}

/// The result of loading a directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Successfully loaded documents, ordered by file name.
    pub documents: Vec<RawDocument>,
    /// Files that failed extraction.
    pub skipped: Vec<SkippedFile>,
}

impl LoadReport {
    /// All pages of all loaded documents, in order.
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.documents.iter().flat_map(|d| d.pages.iter())
    }

    /// Total number of pages loaded.
    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|d| d.pages.len()).sum()
    }

    /// Whether nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Reads PDF slide decks from a directory.
///
/// # Example
///
/// ```rust,ignore
/// use lecture_rag::DocumentLoader;
///
/// let report = DocumentLoader::default().load_dir("data/raw".as_ref());
/// for page in report.pages() {
///     println!("{} p{}: {} chars", page.source, page.number, page.text.len());
/// }
/// ```
#[derive(Clone)]
pub struct DocumentLoader {
    extractor: Arc<dyn PageExtractor>,
}

impl DocumentLoader {
    /// Create a loader using the given extractor.
    pub fn new(extractor: Arc<dyn PageExtractor>) -> Self {
        Self { extractor }
    }

    /// List the `.pdf` files directly inside `dir`, sorted by path.
    ///
    /// Returns an empty list if `dir` does not exist.
    pub fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut files = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_pdf(entry.path()))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();

        files.sort();
        files
    }

    /// Load every PDF in `dir`.
    ///
    /// A missing directory or one without PDFs yields an empty report and a
    /// warning; deciding whether an empty corpus is acceptable is up to the
    /// caller.
    pub fn load_dir(&self, dir: &Path) -> LoadReport {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "document directory does not exist");
            return LoadReport::default();
        }

        let files = self.discover(dir);
        if files.is_empty() {
            warn!(dir = %dir.display(), "no PDF files found");
            return LoadReport::default();
        }

        info!(dir = %dir.display(), file_count = files.len(), "loading documents");
        let mut report = LoadReport::default();

        for path in files {
            let file = file_name(&path);
            match self.extractor.extract_pages(&path) {
                Ok(texts) => {
                    if texts.iter().all(|t| t.trim().is_empty()) {
                        warn!(file = %file, "no extractable text (image-only or encrypted PDF?)");
                    }
                    debug!(file = %file, page_count = texts.len(), "loaded document");
                    report.documents.push(RawDocument::from_pages(file, texts));
                }
                Err(e) => {
                    warn!(file = %file, error = %e, "skipping unreadable document");
                    report.skipped.push(SkippedFile { file, reason: e.to_string() });
                }
            }
        }

        info!(
            document_count = report.documents.len(),
            page_count = report.page_count(),
            skipped = report.skipped.len(),
            "documents loaded"
        );
        report
    }
}

#[cfg(feature = "pdf")]
impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(Arc::new(PdfPageExtractor))
    }
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader").finish_non_exhaustive()
    }
}

pub(crate) fn is_pdf(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
