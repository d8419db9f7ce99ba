//! The completion collaborator: turns a prompt into an answer.

use async_trait::async_trait;

use crate::error::Result;

/// A hosted language model that completes a prompt.
///
/// Network timeouts and retries belong to the implementation; the query
/// engine treats any error from [`complete`](CompletionClient::complete) as a
/// per-query failure and leaves its own state untouched.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// The model identifier, for logs and error messages.
    fn model_id(&self) -> &str;

    /// Check that required configuration (e.g. an API key) is present.
    ///
    /// Called once while the engine loads. The default accepts everything.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Return the completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
