//! Error types for the `lecture-rag` crate.

use thiserror::Error;

/// Errors that can occur while building or serving the RAG index.
///
/// The enum is `Clone` so that a failed engine load can be replayed to every
/// later caller without re-running the load.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RagError {
    /// A required configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The index artifact does not exist at the expected location.
    #[error("Index artifact not found at {location}")]
    ArtifactNotFound {
        /// Where the artifact was looked for (local path or remote key).
        location: String,
    },

    /// The index artifact exists but cannot be decoded or is incompatible.
    #[error("Index artifact at {location} is corrupt or incompatible: {message}")]
    ArtifactCorrupt {
        /// The offending file or directory.
        location: String,
        /// A description of the failure.
        message: String,
    },

    /// Remote storage could not be reached or refused the request.
    #[error("Remote storage error ({backend}): {message}")]
    RemoteTransport {
        /// The storage backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Ingestion found no usable documents or chunks.
    #[error("Empty corpus: {0}")]
    EmptyCorpus(String),

    /// A single source document could not be read.
    #[error("Failed to ingest '{file}': {message}")]
    IngestError {
        /// The source file name.
        file: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The completion service failed or timed out.
    #[error("Completion error ({provider}): {message}")]
    CompletionError {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// The vector index rejected its input.
    #[error("Vector index error: {0}")]
    IndexError(String),

    /// A local filesystem operation failed.
    #[error("I/O error on {path}: {message}")]
    Io {
        /// The path involved.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// An error in pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// The stage of the load or build pipeline an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configuration and credential checks.
    Configuration,
    /// Fetching artifacts from remote storage.
    Download,
    /// Decoding the persisted index.
    Deserialize,
    /// Reading and chunking source documents.
    Ingest,
    /// Embedding text.
    Embedding,
    /// Calling the completion service.
    Completion,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Download => "download",
            Stage::Deserialize => "deserialize",
            Stage::Ingest => "ingest",
            Stage::Embedding => "embedding",
            Stage::Completion => "completion",
            Stage::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl RagError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        RagError::Io { path: path.as_ref().display().to_string(), message: err.to_string() }
    }

    /// The pipeline stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            RagError::ConfigError(_) => Stage::Configuration,
            RagError::ArtifactNotFound { .. } | RagError::RemoteTransport { .. } => Stage::Download,
            RagError::ArtifactCorrupt { .. } => Stage::Deserialize,
            RagError::EmptyCorpus(_) | RagError::IngestError { .. } | RagError::ChunkingError(_) => {
                Stage::Ingest
            }
            RagError::EmbeddingError { .. } => Stage::Embedding,
            RagError::CompletionError { .. } => Stage::Completion,
            RagError::IndexError(_) | RagError::Io { .. } | RagError::PipelineError(_) => {
                Stage::Internal
            }
        }
    }

    /// An actionable next step for the operator, when one is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            RagError::ArtifactNotFound { .. } => Some(
                "the index has not been built yet: run `lecture-rag pipeline` (or `build` then `push`) first",
            ),
            RagError::ConfigError(message) if message.contains("credential") => Some(
                "set the completion API key (LECTURE_RAG_API_KEY or `credential` in the config file)",
            ),
            RagError::EmptyCorpus(_) => {
                Some("add PDF files to the raw documents directory or run `lecture-rag pull-docs`")
            }
            RagError::ArtifactCorrupt { .. } => {
                Some("rebuild the index with the same embedding model the server is configured with")
            }
            _ => None,
        }
    }

    /// Whether the error is tied to a single query and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::CompletionError { .. } | RagError::EmbeddingError { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_download_stage_with_hint() {
        let err = RagError::ArtifactNotFound { location: "bucket/index".into() };
        assert_eq!(err.stage(), Stage::Download);
        assert!(err.hint().unwrap().contains("pipeline"));
    }

    #[test]
    fn missing_credential_has_hint() {
        let err = RagError::ConfigError("completion credential is missing".into());
        assert_eq!(err.stage(), Stage::Configuration);
        assert!(err.hint().is_some());
        assert!(RagError::ConfigError("top_k must be positive".into()).hint().is_none());
    }

    #[test]
    fn only_per_query_errors_are_transient() {
        let completion = RagError::CompletionError { provider: "x".into(), message: "503".into() };
        assert!(completion.is_transient());
        let transport = RagError::RemoteTransport { backend: "fs".into(), message: "denied".into() };
        assert!(!transport.is_transient());
    }
}
