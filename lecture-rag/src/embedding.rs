//! Embedding provider trait for generating vector embeddings from text.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::Result;
use crate::hashing::HashingEmbeddingProvider;

/// A provider that generates vector embeddings from text input.
///
/// The same provider (same [`model_id`](EmbeddingProvider::model_id) and
/// dimensionality) must be used to build an index and to query it; the index
/// artifact records both and the query engine refuses a mismatch.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A stable identifier of the model, recorded in index artifacts.
    fn model_id(&self) -> String;
}

/// Construct the embedding provider described by `config`.
///
/// # Errors
///
/// Returns [`ConfigError`](crate::RagError::ConfigError) if the backend is not compiled in, or
/// [`EmbeddingError`](crate::RagError::EmbeddingError) if the provider cannot be initialized.
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.backend {
        #[cfg(feature = "onnx")]
        EmbeddingBackend::Onnx => Ok(Arc::new(crate::onnx::OnnxEmbeddingProvider::from_config(config))),
        #[cfg(not(feature = "onnx"))]
        EmbeddingBackend::Onnx => Err(crate::error::RagError::ConfigError(
            "the onnx embedding backend requires the `onnx` feature".to_string(),
        )),
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbeddingProvider::new(config.dimensions))),
        #[cfg(feature = "openai")]
        EmbeddingBackend::OpenAI => {
            let api_key = config.credential.clone().unwrap_or_default();
            let mut provider = crate::openai::OpenAIEmbeddingProvider::new(api_key)?
                .with_model(config.model.clone())
                .with_dimensions(config.dimensions);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "openai"))]
        EmbeddingBackend::OpenAI => Err(crate::error::RagError::ConfigError(
            "the openai embedding backend requires the `openai` feature".to_string(),
        )),
    }
}
