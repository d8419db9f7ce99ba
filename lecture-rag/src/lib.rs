//! Retrieval-Augmented Generation over course slide decks.
//!
//! This crate provides:
//! - PDF loading, text normalization and overlapping recursive chunking
//! - Embedding providers (local ONNX sentence-transformer, feature hashing,
//!   OpenAI-compatible HTTP)
//! - A flat cosine-similarity [`VectorIndex`] with a safe on-disk format
//! - [`IndexBuilder`]: documents directory → persisted index
//! - [`ArtifactStore`] sync of the index and raw documents
//! - [`RagEngine`]: lazily loaded index → grounded answer plus sources
//! - Batch evaluation with a CSV report
//!
//! # Features
//!
//! - `pdf` (default): PDF text extraction via `pdf-extract`
//! - `onnx` (default): local sentence embeddings via `tract-onnx` and `tokenizers`
//! - `openai`: OpenAI-compatible embeddings and chat completions
//! - `full`: everything

mod artifact;
mod builder;
mod chunking;
mod completion;
mod config;
mod document;
mod embedding;
mod engine;
mod error;
mod eval;
mod hashing;
mod index;
mod loader;
mod normalize;
#[cfg(feature = "onnx")]
mod onnx;
mod prompt;

#[cfg(feature = "openai")]
pub mod openai;

pub use artifact::{ArtifactStore, FsArtifactStore, object_key, pull_documents, pull_index, push_index};
pub use builder::{BuildReport, DEFAULT_EMBED_BATCH_SIZE, IndexBuilder, IndexBuilderBuilder};
pub use chunking::{Chunker, RecursiveChunker};
pub use completion::CompletionClient;
pub use config::{
    CompletionConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_TOP_K, EmbeddingBackend, EmbeddingConfig, RagConfig, RagConfigBuilder, StorageConfig,
    default_separators,
};
pub use document::{Chunk, Page, QueryResult, RawDocument, SearchResult, unique_sources};
pub use embedding::{EmbeddingProvider, provider_from_config};
pub use engine::{EngineStatus, IndexLocation, RagEngine, RagEngineBuilder};
pub use error::{RagError, Result, Stage};
pub use eval::{
    ANSWER_PREVIEW_CHARS, EvaluationRecord, MANUAL_REVIEW_STATUS, answer_preview,
    default_questions, evaluate, write_report,
};
pub use hashing::HashingEmbeddingProvider;
pub use index::{INDEX_FILES, METADATA_FILE, VECTORS_FILE, VectorIndex};
#[cfg(feature = "pdf")]
pub use loader::PdfPageExtractor;
pub use loader::{DocumentLoader, LoadReport, PageExtractor, SkippedFile};
pub use normalize::normalize;
#[cfg(feature = "onnx")]
pub use onnx::{MODEL_FILE, OnnxEmbeddingProvider, TOKENIZER_FILE};
pub use prompt::{DEFAULT_TEMPLATE, PromptTemplate};
