//! Offline index construction.
//!
//! The [`IndexBuilder`] runs the ingestion workflow end to end:
//! load PDFs → normalize each page → chunk → embed (in batches) → build the
//! [`VectorIndex`] → persist it to a directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use lecture_rag::{IndexBuilder, RagConfig};
//!
//! let builder = IndexBuilder::builder().config(RagConfig::default()).build()?;
//! let report = builder.build_vector_store("data/raw".as_ref(), "models/vector_index".as_ref()).await?;
//! println!("{} chunks from {} documents", report.chunks, report.documents);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Page};
use crate::embedding::{EmbeddingProvider, provider_from_config};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::{DocumentLoader, SkippedFile};
use crate::normalize::normalize;

/// Number of chunk texts sent to the embedder per call.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Documents loaded.
    pub documents: usize,
    /// Pages loaded across all documents.
    pub pages: usize,
    /// Chunks indexed.
    pub chunks: usize,
    /// Files that could not be read.
    pub skipped: Vec<SkippedFile>,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Embedding model the index is tagged with.
    pub model_id: String,
    /// Where the index was written.
    pub output_dir: PathBuf,
}

/// Builds and persists a [`VectorIndex`] from a directory of PDFs.
///
/// Construct one via [`IndexBuilder::builder()`].
pub struct IndexBuilder {
    loader: DocumentLoader,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    /// Create a new [`IndexBuilderBuilder`].
    pub fn builder() -> IndexBuilderBuilder {
        IndexBuilderBuilder::default()
    }

    /// The embedding provider used for chunks.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Build the index from `raw_dir` and save it into `output_dir`.
    ///
    /// Unreadable files are skipped and listed in the report. `output_dir`
    /// and its parents are created only once there is something to write.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyCorpus`] if no document loads or no chunk
    /// survives normalization, the embedder's error if embedding fails, and
    /// I/O errors from persisting.
    pub async fn build_vector_store(&self, raw_dir: &Path, output_dir: &Path) -> Result<BuildReport> {
        let loader = self.loader.clone();
        let dir = raw_dir.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || loader.load_dir(&dir))
            .await
            .map_err(|e| RagError::PipelineError(format!("document loading task failed: {e}")))?;

        if loaded.is_empty() {
            return Err(RagError::EmptyCorpus(format!(
                "no readable PDF documents in {}",
                raw_dir.display()
            )));
        }

        let chunks: Vec<Chunk> = loaded
            .pages()
            .map(|page| Page { text: normalize(&page.text), ..page.clone() })
            .flat_map(|page| self.chunker.chunk(&page))
            .collect();

        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus(format!(
                "documents in {} contain no extractable text",
                raw_dir.display()
            )));
        }

        info!(
            document_count = loaded.documents.len(),
            chunk_count = chunks.len(),
            model = %self.embedder.model_id(),
            "embedding chunks"
        );

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(error = %e, first_chunk = %batch[0].id, "embedding failed during build");
                e
            })?;
            embeddings.extend(vectors);
        }

        let index = VectorIndex::build(self.embedder.model_id(), chunks, embeddings)?;
        let report = BuildReport {
            documents: loaded.documents.len(),
            pages: loaded.page_count(),
            chunks: index.len(),
            skipped: loaded.skipped,
            dimensions: index.dimensions(),
            model_id: index.model_id().to_string(),
            output_dir: output_dir.to_path_buf(),
        };

        let target = output_dir.to_path_buf();
        tokio::task::spawn_blocking(move || index.save(&target))
            .await
            .map_err(|e| RagError::PipelineError(format!("index save task failed: {e}")))??;

        info!(
            output_dir = %output_dir.display(),
            chunk_count = report.chunks,
            skipped = report.skipped.len(),
            "vector index built"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("loader", &self.loader)
            .field("model_id", &self.embedder.model_id())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Builder for [`IndexBuilder`].
///
/// Only `config` is required: the loader defaults to the PDF extractor (with
/// the `pdf` feature), the chunker and embedder are derived from the config.
#[derive(Default)]
pub struct IndexBuilderBuilder {
    config: Option<RagConfig>,
    loader: Option<DocumentLoader>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    batch_size: Option<usize>,
}

impl IndexBuilderBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Override the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set how many chunks are embedded per call.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Build the [`IndexBuilder`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the config is missing or invalid,
    /// if no loader is available, or if the batch size is zero.
    pub fn build(self) -> Result<IndexBuilder> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;

        let batch_size = self.batch_size.unwrap_or(DEFAULT_EMBED_BATCH_SIZE);
        if batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".to_string()));
        }

        let loader = match self.loader {
            Some(loader) => loader,
            None => default_loader()?,
        };
        let chunker = self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => provider_from_config(&config.embedding)?,
        };

        Ok(IndexBuilder { loader, chunker, embedder, batch_size })
    }
}

#[cfg(feature = "pdf")]
fn default_loader() -> Result<DocumentLoader> {
    Ok(DocumentLoader::default())
}

#[cfg(not(feature = "pdf"))]
fn default_loader() -> Result<DocumentLoader> {
    Err(RagError::ConfigError(
        "loader is required when the `pdf` feature is disabled".to_string(),
    ))
}
