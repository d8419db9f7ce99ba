//! Local sentence embeddings from an ONNX transformer encoder.
//!
//! The model directory holds a BERT-style encoder exported to ONNX
//! (`model.onnx`, e.g. `sentence-transformers/all-MiniLM-L6-v2`) and its
//! HuggingFace `tokenizer.json`. Token embeddings are mean-pooled over the
//! attention mask and L2-normalised, which reproduces sentence-transformers
//! output for these models.
//!
//! The model is loaded on first use, so constructing the provider never
//! touches the filesystem. Loading and inference run on the blocking pool.
//!
//! This module is only available when the `onnx` feature is enabled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Encoder graph file inside the model directory.
pub const MODEL_FILE: &str = "model.onnx";
/// Tokenizer definition inside the model directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Word pieces beyond this are dropped, as sentence-transformers does for MiniLM.
const MAX_SEQUENCE_LENGTH: usize = 256;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An [`EmbeddingProvider`] running a sentence-transformer locally.
///
/// ```rust,ignore
/// use lecture_rag::{EmbeddingConfig, OnnxEmbeddingProvider};
///
/// let provider = OnnxEmbeddingProvider::from_config(&EmbeddingConfig::default());
/// let vector = provider.embed("What is self-attention?").await?;
/// ```
pub struct OnnxEmbeddingProvider {
    model_dir: PathBuf,
    model_id: String,
    dimensions: usize,
    encoder: OnceCell<Arc<Encoder>>,
}

impl OnnxEmbeddingProvider {
    /// A provider for the model in `model_dir`, producing `dimensions`-sized vectors.
    pub fn new(model_dir: impl Into<PathBuf>, model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_dir: model_dir.into(),
            model_id: model_id.into(),
            dimensions,
            encoder: OnceCell::new(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.model_dir.clone(), config.model.clone(), config.dimensions)
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    async fn encoder(&self) -> Result<Arc<Encoder>> {
        self.encoder
            .get_or_try_init(|| async {
                let dir = self.model_dir.clone();
                let encoder = tokio::task::spawn_blocking(move || Encoder::load(&dir))
                    .await
                    .map_err(|e| embedding_error(format!("model loading task failed: {e}")))??;
                info!(
                    model = %self.model_id,
                    dir = %self.model_dir.display(),
                    inputs = encoder.inputs,
                    "loaded ONNX embedding model"
                );
                Ok::<_, RagError>(Arc::new(encoder))
            })
            .await
            .cloned()
    }
}

impl std::fmt::Debug for OnnxEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingProvider")
            .field("model_dir", &self.model_dir)
            .field("model_id", &self.model_id)
            .field("dimensions", &self.dimensions)
            .field("loaded", &self.encoder.initialized())
            .finish()
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("model returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encoder = self.encoder().await?;
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let embeddings = tokio::task::spawn_blocking(move || encoder.embed(&owned))
            .await
            .map_err(|e| embedding_error(format!("inference task failed: {e}")))??;

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(embedding_error(format!(
                "model produced {}-dimensional vectors, expected {}",
                bad.len(),
                self.dimensions
            )));
        }
        debug!(count = embeddings.len(), "embedded batch");
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }
}

struct Encoder {
    model: TractModel,
    tokenizer: Tokenizer,
    /// 2 for encoders without `token_type_ids`, otherwise 3.
    inputs: usize,
}

impl Encoder {
    fn load(dir: &Path) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let tokenizer_path = dir.join(TOKENIZER_FILE);
        for path in [&model_path, &tokenizer_path] {
            if !path.is_file() {
                return Err(RagError::ConfigError(format!(
                    "embedding model file {} is missing",
                    path.display()
                )));
            }
        }

        let model = tract_onnx::onnx()
            .model_for_path(&model_path)
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| embedding_error(format!("failed to load {}: {e}", model_path.display())))?;
        let inputs = model
            .model()
            .input_outlets()
            .map_err(|e| embedding_error(e.to_string()))?
            .len()
            .min(3);

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            embedding_error(format!("failed to load {}: {e}", tokenizer_path.display()))
        })?;

        Ok(Self { model, tokenizer, inputs })
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut encoded = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| embedding_error(format!("tokenization failed: {e}")))?;
            let len = encoding.get_ids().len().min(MAX_SEQUENCE_LENGTH);
            encoded.push((
                widen(&encoding.get_ids()[..len]),
                widen(&encoding.get_attention_mask()[..len]),
                widen(&encoding.get_type_ids()[..len]),
            ));
        }

        let batch = encoded.len();
        let seq_len = encoded.iter().map(|(ids, _, _)| ids.len()).max().unwrap_or(0).max(1);
        let mut input_ids = vec![0i64; batch * seq_len];
        let mut attention_mask = vec![0i64; batch * seq_len];
        let mut token_type_ids = vec![0i64; batch * seq_len];
        for (row, (ids, mask, types)) in encoded.iter().enumerate() {
            let start = row * seq_len;
            input_ids[start..start + ids.len()].copy_from_slice(ids);
            attention_mask[start..start + mask.len()].copy_from_slice(mask);
            token_type_ids[start..start + types.len()].copy_from_slice(types);
        }

        let shape = [batch, seq_len];
        let mut inputs: TVec<TValue> = tvec![
            tensor(&shape, &input_ids)?.into(),
            tensor(&shape, &attention_mask)?.into(),
            tensor(&shape, &token_type_ids)?.into(),
        ];
        inputs.truncate(self.inputs);

        let outputs =
            self.model.run(inputs).map_err(|e| embedding_error(format!("inference failed: {e}")))?;
        let hidden = outputs
            .first()
            .ok_or_else(|| embedding_error("model has no outputs".to_string()))?
            .to_array_view::<f32>()
            .map_err(|e| embedding_error(e.to_string()))?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|e| embedding_error(format!("expected (batch, tokens, hidden) output: {e}")))?;

        let mut embeddings = mean_pool(hidden, &attention_mask, seq_len);
        embeddings.iter_mut().for_each(|e| l2_normalize(e));
        Ok(embeddings)
    }
}

fn widen(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

fn tensor(shape: &[usize], data: &[i64]) -> Result<Tensor> {
    Tensor::from_shape(shape, data).map_err(|e| embedding_error(e.to_string()))
}

/// Average the token vectors of each row over the positions the mask keeps.
fn mean_pool(hidden: tract_ndarray::ArrayView3<'_, f32>, mask: &[i64], seq_len: usize) -> Vec<Vec<f32>> {
    let (batch, tokens, hidden_size) = hidden.dim();
    (0..batch)
        .map(|i| {
            let mut sum = vec![0.0f32; hidden_size];
            let mut count = 0.0f32;
            for j in 0..tokens.min(seq_len) {
                if mask[i * seq_len + j] > 0 {
                    for (k, value) in sum.iter_mut().enumerate() {
                        *value += hidden[[i, j, k]];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                sum.iter_mut().for_each(|v| *v /= count);
            }
            sum
        })
        .collect()
}

fn l2_normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= norm);
    }
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: "onnx".to_string(), message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_skips_padding() {
        // Two rows of three tokens, two hidden units; row 1 has one padded token.
        let hidden = tract_ndarray::Array3::from_shape_vec(
            (2, 3, 2),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 2.0, 2.0, 4.0, 0.0, 100.0, 100.0],
        )
        .unwrap();
        let mask = [1, 1, 1, 1, 1, 0];

        let pooled = mean_pool(hidden.view(), &mask, 3);
        assert_eq!(pooled, vec![vec![3.0, 4.0], vec![3.0, 1.0]]);
    }

    #[test]
    fn normalisation_yields_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, [0.0, 0.0]);
    }

    #[test]
    fn identity_comes_from_config_without_loading() {
        let provider = OnnxEmbeddingProvider::from_config(&EmbeddingConfig::default());
        assert_eq!(provider.model_id(), "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(provider.dimensions(), 384);
        assert!(format!("{provider:?}").contains("loaded: false"));
    }

    #[tokio::test]
    async fn missing_model_files_are_a_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let provider = OnnxEmbeddingProvider::new(temp.path(), "all-MiniLM-L6-v2", 384);

        assert_eq!(provider.embed_batch(&[]).await.unwrap(), Vec::<Vec<f32>>::new());
        let err = provider.embed("attention").await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(ref m) if m.contains(MODEL_FILE)));
    }
}
