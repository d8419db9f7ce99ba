//! OpenAI-compatible HTTP backends: embeddings and chat completions.
//!
//! Works against OpenAI itself and against any server speaking the same API
//! (Groq, vLLM, Ollama, text-embeddings-inference, ...).
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::completion::CompletionClient;
use crate::config::CompletionConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – Matryoshka dimension override, also the expected vector size.
/// - `base_url` – defaults to `https://api.openai.com/v1`.
///
/// # Example
///
/// ```rust,ignore
/// use lecture_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the provider at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Read a non-success response body and extract the API's error message.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: "OpenAI".into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "OpenAI",
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "request failed");
                RagError::EmbeddingError {
                    provider: "OpenAI".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = "OpenAI", %message, "API error");
            return Err(RagError::EmbeddingError { provider: "OpenAI".into(), message });
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: "OpenAI".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        if embedding_response.data.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: "OpenAI".into(),
                message: format!(
                    "API returned {} embeddings for {} inputs",
                    embedding_response.data.len(),
                    texts.len()
                ),
            });
        }

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("openai:{}:{}", self.model, self.dimensions)
    }
}

// ── CompletionClient implementation ────────────────────────────────

/// A [`CompletionClient`] for OpenAI-compatible `/chat/completions` APIs.
///
/// The credential is checked by [`validate`](CompletionClient::validate),
/// which the query engine calls while loading, so a missing key surfaces as a
/// configuration error before the first question rather than on it.
///
/// # Example
///
/// ```rust,ignore
/// use lecture_rag::{CompletionConfig, openai::OpenAICompatibleClient};
///
/// let client = OpenAICompatibleClient::new(&CompletionConfig {
///     credential: Some("gsk-...".into()),
///     ..Default::default()
/// })?;
/// let answer = client.complete("Say hi").await?;
/// ```
pub struct OpenAICompatibleClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAICompatibleClient {
    /// Create a client from completion settings.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.credential.clone().filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(RagError::ConfigError(format!(
                "completion credential is missing for model '{}'",
                self.model
            )));
        }
        Ok(())
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            RagError::ConfigError("completion credential is missing".to_string())
        })?;

        debug!(
            provider = "OpenAI",
            model = %self.model,
            prompt_len = prompt.len(),
            "completion request"
        );

        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "completion request failed");
                RagError::CompletionError {
                    provider: self.model.clone(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = "OpenAI", %message, "completion API error");
            return Err(RagError::CompletionError { provider: self.model.clone(), message });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse completion response");
            RagError::CompletionError {
                provider: self.model.clone(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::CompletionError {
                provider: self.model.clone(),
                message: "API returned no choices".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_embedding_key_is_rejected() {
        assert!(OpenAIEmbeddingProvider::new("").is_err());
    }

    #[test]
    fn embedding_model_id_tracks_model_and_dimensions() {
        let provider = OpenAIEmbeddingProvider::new("sk-test")
            .unwrap()
            .with_model("all-MiniLM-L6-v2")
            .with_dimensions(384)
            .with_base_url("http://127.0.0.1:8080/v1/");
        assert_eq!(provider.model_id(), "openai:all-MiniLM-L6-v2:384");
        assert_eq!(provider.base_url, "http://127.0.0.1:8080/v1");
    }

    #[test]
    fn missing_completion_key_fails_validation() {
        let client = OpenAICompatibleClient::new(&CompletionConfig::default()).unwrap();
        let err = client.validate().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
        assert!(err.hint().is_some());
    }

    #[test]
    fn blank_completion_key_counts_as_missing() {
        let config = CompletionConfig { credential: Some("  ".into()), ..Default::default() };
        assert!(OpenAICompatibleClient::new(&config).unwrap().validate().is_err());
    }

    #[test]
    fn chat_request_serializes_openai_shape() {
        let body = ChatRequest {
            model: "llama-3.1-8b-instant",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["model"], "llama-3.1-8b-instant");
    }
}
