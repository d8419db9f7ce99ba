//! Configuration for the index builder and the query engine.
//!
//! A single [`RagConfig`] is resolved by the outermost entry point (CLI,
//! chat shell, evaluation run) and passed down to constructors. Nothing in
//! the pipeline reads the process environment on its own.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
/// Default number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 4;

/// Default split preference: paragraph, line, sentence end, word, raw cut.
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ".", " ", ""].iter().map(|s| s.to_string()).collect()
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks to retrieve per query.
    pub top_k: usize,
    /// Ordered split preference. The empty string means a raw character cut.
    pub separators: Vec<String>,
    /// Where index artifacts and raw documents live.
    pub storage: StorageConfig,
    /// The embedding model used at build and query time.
    pub embedding: EmbeddingConfig,
    /// The hosted completion model.
    pub completion: CompletionConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            separators: default_separators(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

/// Remote storage location of the index artifact and the raw documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket (or top-level directory for filesystem-backed stores).
    pub bucket: String,
    /// Key prefix under which the two index files live.
    pub index_prefix: String,
    /// Key prefix under which raw PDF documents live.
    pub documents_prefix: String,
    /// Storage region, for backends that need one.
    pub region: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            index_prefix: "artifacts/vector_index".to_string(),
            documents_prefix: "raw".to_string(),
            region: None,
        }
    }
}

impl StorageConfig {
    /// Check that a bucket has been configured.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the bucket name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(RagError::ConfigError("storage bucket name is missing".to_string()));
        }
        Ok(())
    }
}

/// Default local sentence-embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX sentence-transformer (feature `onnx`).
    #[default]
    Onnx,
    /// Deterministic feature hashing. Offline fallback; lexical only.
    Hashing,
    /// An OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
}

/// Embedding model identity.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// The embedding backend.
    pub backend: EmbeddingBackend,
    /// Model name sent to remote backends; recorded in the index artifact.
    pub model: String,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Directory holding `model.onnx` and `tokenizer.json` for the onnx backend.
    pub model_dir: PathBuf,
    /// Base URL for remote backends.
    pub base_url: Option<String>,
    /// API key for remote backends.
    #[serde(skip_serializing)]
    pub credential: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Onnx,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: 384,
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
            base_url: None,
            credential: None,
        }
    }
}

impl EmbeddingConfig {
    /// The feature-hashing backend with `dimensions` components.
    pub fn hashing(dimensions: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model: "hashing-bow".to_string(),
            dimensions,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("model_dir", &self.model_dir)
            .field("base_url", &self.base_url)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Hosted completion model settings.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Model name, e.g. `llama-3.1-8b-instant`.
    pub model: String,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// API key. Its absence is a load-time configuration error.
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            credential: None,
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embedding.dimensions == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embedding.dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the ordered split preference list.
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Set the storage location.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Set the embedding model settings.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Set the completion model settings.
    pub fn completion(mut self, completion: CompletionConfig) -> Self {
        self.config.completion = completion;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
