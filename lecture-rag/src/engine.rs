//! The serving-time query engine.
//!
//! [`RagEngine`] owns the persisted index once loaded and answers questions:
//! embed the query → search top-k → render the grounding prompt → complete →
//! deduplicate sources.
//!
//! The engine is a three-state machine behind an async mutex:
//!
//! ```text
//!  Uninitialized ──load ok──▶ Ready
//!        │                      ▲
//!    load err               load ok
//!        ▼                      │
//!      Failed ───── load ───────┘
//! ```
//!
//! `predict` lazily loads from `Uninitialized`, but from `Failed` it returns
//! the stored error without touching the network; only an explicit
//! [`load`](RagEngine::load) retries. Per-query errors never change state.
//!
//! # Example
//!
//! ```rust,ignore
//! use lecture_rag::{IndexLocation, RagConfig, RagEngine};
//!
//! let engine = RagEngine::builder()
//!     .config(config)
//!     .completion(Arc::new(client))
//!     .location(IndexLocation::Local("models/vector_index".into()))
//!     .build()?;
//! let result = engine.predict("What is MLOps?").await?;
//! println!("{}\nSources: {:?}", result.answer, result.sources);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::artifact::{ArtifactStore, object_key, pull_index};
use crate::completion::CompletionClient;
use crate::config::RagConfig;
use crate::document::{QueryResult, unique_sources};
use crate::embedding::{EmbeddingProvider, provider_from_config};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::prompt::PromptTemplate;

/// Where the engine finds its index.
#[derive(Clone)]
pub enum IndexLocation {
    /// An index directory on local disk, read in place.
    Local(PathBuf),
    /// An index under `prefix` in an artifact store, fetched into `cache_dir`.
    Remote {
        /// The store holding the artifact.
        store: Arc<dyn ArtifactStore>,
        /// The key prefix of the index files.
        prefix: String,
        /// Local directory the files are downloaded to.
        cache_dir: PathBuf,
    },
}

impl IndexLocation {
    fn describe(&self) -> String {
        match self {
            IndexLocation::Local(dir) => dir.display().to_string(),
            IndexLocation::Remote { store, prefix, .. } => {
                format!("{}/{}", store.name(), object_key(prefix, ""))
            }
        }
    }
}

impl std::fmt::Debug for IndexLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexLocation::Local(dir) => f.debug_tuple("Local").field(dir).finish(),
            IndexLocation::Remote { store, prefix, cache_dir } => f
                .debug_struct("Remote")
                .field("store", &store.name())
                .field("prefix", prefix)
                .field("cache_dir", cache_dir)
                .finish(),
        }
    }
}

/// An observable snapshot of the engine state.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    /// Nothing has been loaded yet.
    Uninitialized,
    /// The index is loaded.
    Ready {
        /// Number of indexed chunks.
        chunks: usize,
        /// Embedding model the index was built with.
        model_id: String,
    },
    /// The last load failed with this error.
    Failed(RagError),
}

struct Loaded {
    index: VectorIndex,
}

enum EngineState {
    Uninitialized,
    Ready(Arc<Loaded>),
    Failed(RagError),
}

/// Answers questions over a persisted [`VectorIndex`].
///
/// Construct one via [`RagEngine::builder()`]. The engine is `Send + Sync`;
/// share it behind an `Arc` and call [`predict`](RagEngine::predict)
/// concurrently.
pub struct RagEngine {
    top_k: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionClient>,
    location: IndexLocation,
    prompt: PromptTemplate,
    state: Mutex<EngineState>,
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Where the index is loaded from.
    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    /// The current state.
    pub async fn status(&self) -> EngineStatus {
        match &*self.state.lock().await {
            EngineState::Uninitialized => EngineStatus::Uninitialized,
            EngineState::Ready(loaded) => EngineStatus::Ready {
                chunks: loaded.index.len(),
                model_id: loaded.index.model_id().to_string(),
            },
            EngineState::Failed(e) => EngineStatus::Failed(e.clone()),
        }
    }

    /// Load the index, unless it is already loaded.
    ///
    /// Checks the completion credential, fetches the artifact (for a remote
    /// location), deserializes it and checks it was built with the
    /// configured embedding model. Concurrent callers are serialized: the
    /// first performs the load, the rest observe its outcome.
    ///
    /// # Errors
    ///
    /// Returns the failing stage's error and leaves the engine `Failed`. A
    /// later call retries.
    pub async fn load(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, EngineState::Ready(_)) {
            return Ok(());
        }
        self.transition(&mut state).await.map(|_| ())
    }

    /// Answer `query` from the indexed documents.
    ///
    /// Loads the index first if nothing has been loaded yet.
    ///
    /// # Errors
    ///
    /// From `Failed`, returns the stored load error. Otherwise returns the
    /// load error, or the embedding/completion error for this query.
    pub async fn predict(&self, query: &str) -> Result<QueryResult> {
        let loaded = {
            let mut state = self.state.lock().await;
            match &*state {
                EngineState::Ready(loaded) => Arc::clone(loaded),
                EngineState::Failed(e) => return Err(e.clone()),
                EngineState::Uninitialized => self.transition(&mut state).await?,
            }
        };

        debug!(query_len = query.len(), top_k = self.top_k, "answering query");
        let query_vector = self.embedder.embed(query).await?;
        let retrieved = loaded.index.search(&query_vector, self.top_k)?;
        let prompt = self.prompt.render(query, &retrieved);
        let answer = self.completion.complete(&prompt).await?;
        let sources = unique_sources(retrieved.iter().map(|r| &r.chunk));

        info!(
            retrieved = retrieved.len(),
            sources = ?sources,
            answer_len = answer.len(),
            "query answered"
        );
        Ok(QueryResult { answer, sources, chunks: retrieved })
    }

    async fn transition(&self, state: &mut EngineState) -> Result<Arc<Loaded>> {
        match self.load_index().await {
            Ok(index) => {
                info!(
                    location = %self.location.describe(),
                    chunks = index.len(),
                    model = %index.model_id(),
                    "index loaded"
                );
                let loaded = Arc::new(Loaded { index });
                *state = EngineState::Ready(Arc::clone(&loaded));
                Ok(loaded)
            }
            Err(e) => {
                error!(
                    location = %self.location.describe(),
                    stage = %e.stage(),
                    error = %e,
                    "index load failed"
                );
                *state = EngineState::Failed(e.clone());
                Err(e)
            }
        }
    }

    async fn load_index(&self) -> Result<VectorIndex> {
        self.completion.validate()?;

        let dir = match &self.location {
            IndexLocation::Local(dir) => dir.clone(),
            IndexLocation::Remote { store, prefix, cache_dir } => {
                pull_index(store.as_ref(), prefix, cache_dir).await?;
                cache_dir.clone()
            }
        };

        let index = read_index(dir.clone()).await?;
        check_compatible(&index, self.embedder.as_ref(), &dir)?;
        Ok(index)
    }
}

async fn read_index(dir: PathBuf) -> Result<VectorIndex> {
    tokio::task::spawn_blocking(move || VectorIndex::load(&dir))
        .await
        .map_err(|e| RagError::PipelineError(format!("index load task failed: {e}")))?
}

fn check_compatible(index: &VectorIndex, embedder: &dyn EmbeddingProvider, dir: &Path) -> Result<()> {
    let expected = embedder.model_id();
    if index.model_id() != expected || index.dimensions() != embedder.dimensions() {
        return Err(RagError::ArtifactCorrupt {
            location: dir.display().to_string(),
            message: format!(
                "index was built with '{}' ({} dimensions) but the engine embeds with '{}' ({} dimensions)",
                index.model_id(),
                index.dimensions(),
                expected,
                embedder.dimensions()
            ),
        });
    }
    Ok(())
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("top_k", &self.top_k)
            .field("embedder", &self.embedder.model_id())
            .field("completion", &self.completion.model_id())
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RagEngine`].
///
/// `config`, `completion` and `location` are required. The embedder is
/// derived from the config unless set explicitly.
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    completion: Option<Arc<dyn CompletionClient>>,
    location: Option<IndexLocation>,
    prompt: Option<PromptTemplate>,
}

impl RagEngineBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the completion client.
    pub fn completion(mut self, completion: Arc<dyn CompletionClient>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Set where the index is loaded from.
    pub fn location(mut self, location: IndexLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Override the prompt template.
    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Build the [`RagEngine`] in the `Uninitialized` state.
    ///
    /// Nothing is fetched or validated against the network here.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the config is invalid.
    pub fn build(self) -> Result<RagEngine> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let completion = self
            .completion
            .ok_or_else(|| RagError::ConfigError("completion is required".to_string()))?;
        let location = self
            .location
            .ok_or_else(|| RagError::ConfigError("location is required".to_string()))?;
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => provider_from_config(&config.embedding)?,
        };

        Ok(RagEngine {
            top_k: config.top_k,
            embedder,
            completion,
            location,
            prompt: self.prompt.unwrap_or_default(),
            state: Mutex::new(EngineState::Uninitialized),
        })
    }
}
