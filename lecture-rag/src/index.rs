//! Flat vector index with cosine-similarity search and on-disk persistence.
//!
//! A persisted index is a directory holding exactly two files that are always
//! written and read together:
//!
//! - `index.vectors`: a little-endian binary header (magic, format version,
//!   dimensions, row count) followed by row-major `f32` data;
//! - `index.json`: metadata (format version, embedding model id, dimensions,
//!   row count, SHA-256 of `index.vectors`, creation time) and the chunk list.
//!
//! Loading only ever decodes numbers into an `f32` buffer and JSON into fixed
//! structs. The checksum ties the pair together, so files from two different
//! builds are rejected instead of silently mismatching vectors and text.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// File holding the vector data.
pub const VECTORS_FILE: &str = "index.vectors";
/// File holding metadata and chunk text.
pub const METADATA_FILE: &str = "index.json";
/// Both artifact files, in the order they are transferred.
pub const INDEX_FILES: [&str; 2] = [VECTORS_FILE, METADATA_FILE];

const MAGIC: &[u8; 8] = b"LRAGVEC\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexMetadata {
    format_version: u32,
    model_id: String,
    dimensions: usize,
    count: usize,
    vectors_sha256: String,
    created_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
}

/// An immutable set of chunks and their embeddings.
///
/// Internal chunk identifiers are insertion positions. Built once per corpus
/// version, then only searched.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model_id: String,
    dimensions: usize,
    vectors: Vec<f32>,
    norms: Vec<f32>,
    chunks: Vec<Chunk>,
    created_at: DateTime<Utc>,
}

impl VectorIndex {
    /// Build an index from parallel chunk and embedding sequences.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if the sequences differ in length or
    /// are empty, if embeddings are not all of the same non-zero dimension,
    /// if a value is not finite, or if a chunk has no source.
    pub fn build(
        model_id: impl Into<String>,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::IndexError(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let Some(dimensions) = embeddings.first().map(Vec::len) else {
            return Err(RagError::IndexError("cannot build an empty index".to_string()));
        };
        if dimensions == 0 {
            return Err(RagError::IndexError("embeddings have zero dimensions".to_string()));
        }

        let mut vectors = Vec::with_capacity(dimensions * embeddings.len());
        for (i, (embedding, chunk)) in embeddings.iter().zip(&chunks).enumerate() {
            if embedding.len() != dimensions {
                return Err(RagError::IndexError(format!(
                    "embedding {i} has {} dimensions, expected {dimensions}",
                    embedding.len()
                )));
            }
            if embedding.iter().any(|x| !x.is_finite()) {
                return Err(RagError::IndexError(format!("embedding {i} has non-finite values")));
            }
            if chunk.source.is_empty() {
                return Err(RagError::IndexError(format!("chunk {} has no source", chunk.id)));
            }
            vectors.extend_from_slice(embedding);
        }

        Ok(Self::from_parts(model_id.into(), dimensions, vectors, chunks, Utc::now()))
    }

    fn from_parts(
        model_id: String,
        dimensions: usize,
        vectors: Vec<f32>,
        chunks: Vec<Chunk>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let norms = vectors.chunks_exact(dimensions).map(l2_norm).collect();
        Self { model_id, dimensions, vectors, norms, chunks, created_at }
    }

    /// The embedding model the index was built with.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Vector dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks. Always false for a built index.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The indexed chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// When the index was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Return the `k` chunks most similar to `query`, nearest first.
    ///
    /// `k` is clamped to the number of chunks. Equal scores keep insertion
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if `query` has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimensions {
            return Err(RagError::IndexError(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimensions)
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (row, norm))| (i, cosine_similarity(row, query, *norm, query_norm)))
            .collect();

        // sort_by is stable: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k.min(self.chunks.len()));

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.chunks[i].clone(), score })
            .collect())
    }

    /// Persist the index into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if a file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| RagError::io(dir, e))?;

        let vector_bytes = self.encode_vectors();
        let metadata = IndexMetadata {
            format_version: FORMAT_VERSION,
            model_id: self.model_id.clone(),
            dimensions: self.dimensions,
            count: self.chunks.len(),
            vectors_sha256: hex::encode(Sha256::digest(&vector_bytes)),
            created_at: self.created_at,
            chunks: self.chunks.clone(),
        };
        let metadata_bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| RagError::IndexError(format!("failed to encode metadata: {e}")))?;

        write_atomic(&dir.join(VECTORS_FILE), &vector_bytes)?;
        write_atomic(&dir.join(METADATA_FILE), &metadata_bytes)?;

        info!(
            dir = %dir.display(),
            chunk_count = self.chunks.len(),
            dimensions = self.dimensions,
            "saved vector index"
        );
        Ok(())
    }

    /// Load an index previously written by [`save`](VectorIndex::save).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ArtifactNotFound`] if the directory or either file
    /// is missing, and [`RagError::ArtifactCorrupt`] if the files cannot be
    /// decoded, use an unknown format version, or do not belong together.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(RagError::ArtifactNotFound { location: dir.display().to_string() });
        }
        for name in INDEX_FILES {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(RagError::ArtifactNotFound { location: path.display().to_string() });
            }
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let vector_bytes = read_artifact(&vectors_path)?;
        let metadata_bytes = read_artifact(&metadata_path)?;

        let corrupt = |path: &Path, message: String| RagError::ArtifactCorrupt {
            location: path.display().to_string(),
            message,
        };

        let metadata: IndexMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| corrupt(&metadata_path, format!("invalid metadata: {e}")))?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(corrupt(
                &metadata_path,
                format!("unsupported format version {}", metadata.format_version),
            ));
        }
        if hex::encode(Sha256::digest(&vector_bytes)) != metadata.vectors_sha256 {
            return Err(corrupt(
                &vectors_path,
                "checksum does not match metadata (files from different builds?)".to_string(),
            ));
        }

        let (dimensions, vectors) =
            decode_vectors(&vector_bytes).map_err(|message| corrupt(&vectors_path, message))?;
        let count = vectors.len() / dimensions;
        if dimensions != metadata.dimensions
            || count != metadata.count
            || count != metadata.chunks.len()
        {
            return Err(corrupt(
                dir,
                format!(
                    "shape mismatch: vectors {count}x{dimensions}, metadata {}x{} with {} chunks",
                    metadata.count,
                    metadata.dimensions,
                    metadata.chunks.len()
                ),
            ));
        }
        if let Some(chunk) = metadata.chunks.iter().find(|c| c.source.is_empty()) {
            return Err(corrupt(&metadata_path, format!("chunk {} has no source", chunk.id)));
        }

        debug!(dir = %dir.display(), chunk_count = count, dimensions, "loaded vector index");
        Ok(Self::from_parts(
            metadata.model_id,
            dimensions,
            vectors,
            metadata.chunks,
            metadata.created_at,
        ))
    }

    fn encode_vectors(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimensions as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.chunks.len() as u64).to_le_bytes());
        for value in &self.vectors {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

/// Decode the binary vector file into (dimensions, row-major data).
fn decode_vectors(bytes: &[u8]) -> std::result::Result<(usize, Vec<f32>), String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    let (header, data) = bytes.split_at(HEADER_LEN);
    if &header[0..8] != MAGIC {
        return Err("bad magic bytes".to_string());
    }
    let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported vector format version {version}"));
    }
    let dimensions = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[16..24]);
    let count = u64::from_le_bytes(count_bytes);

    if dimensions == 0 || count == 0 {
        return Err(format!("empty index ({count}x{dimensions})"));
    }
    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(dimensions))
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| format!("implausible shape {count}x{dimensions}"))?;
    if data.len() != expected {
        return Err(format!("expected {expected} bytes of vector data, found {}", data.len()));
    }

    let vectors: Vec<f32> = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if vectors.iter().any(|x| !x.is_finite()) {
        return Err("vector data contains non-finite values".to_string());
    }
    Ok((dimensions, vectors))
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| RagError::ArtifactCorrupt {
        location: path.display().to_string(),
        message: format!("unreadable: {e}"),
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, bytes).map_err(|e| RagError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| RagError::io(path, e))
}

/// `index.json` -> `index.json.tmp`, keeping each file's temporary distinct.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity given precomputed norms. Zero vectors score 0.0.
fn cosine_similarity(a: &[f32], b: &[f32], norm_a: f32, norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(i: usize, source: &str) -> Chunk {
        Chunk {
            id: format!("{source}#p1_{i}"),
            text: format!("chunk {i}"),
            source: source.into(),
            page: 1,
            offset: 0,
        }
    }

    fn sample() -> VectorIndex {
        VectorIndex::build(
            "test-model",
            vec![chunk(0, "a.pdf"), chunk(1, "b.pdf"), chunk(2, "c.pdf")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap()
    }

    #[test]
    fn build_rejects_length_mismatch() {
        let err = VectorIndex::build("m", vec![chunk(0, "a.pdf")], vec![]).unwrap_err();
        assert!(matches!(err, RagError::IndexError(_)));
    }

    #[test]
    fn build_rejects_empty_input() {
        assert!(VectorIndex::build("m", vec![], vec![]).is_err());
    }

    #[test]
    fn build_rejects_ragged_dimensions() {
        let err = VectorIndex::build(
            "m",
            vec![chunk(0, "a.pdf"), chunk(1, "a.pdf")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding 1"));
    }

    #[test]
    fn build_rejects_missing_provenance() {
        assert!(VectorIndex::build("m", vec![chunk(0, "")], vec![vec![1.0]]).is_err());
    }

    #[test]
    fn search_orders_nearest_first() {
        let results = sample().search(&[1.0, 0.1], 3).unwrap();
        let sources: Vec<_> = results.iter().map(|r| r.chunk.source.as_str()).collect();
        assert_eq!(sources, ["a.pdf", "c.pdf", "b.pdf"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn search_clamps_k() {
        assert_eq!(sample().search(&[1.0, 0.0], 50).unwrap().len(), 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::build(
            "m",
            vec![chunk(0, "first.pdf"), chunk(1, "second.pdf"), chunk(2, "third.pdf")],
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.source, "second.pdf");
        assert_eq!(results[1].chunk.source, "third.pdf");
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        assert!(sample().search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn zero_query_scores_zero() {
        let results = sample().search(&[0.0, 0.0], 3).unwrap();
        assert!(results.iter().all(|r| r.score == 0.0));
        assert_eq!(results[0].chunk.source, "a.pdf");
    }

    #[test]
    fn save_writes_both_files_without_temporaries() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested/index");
        sample().save(&dir).unwrap();
        let mut names: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["index.json", "index.vectors"]);
    }

    #[test]
    fn decode_rejects_truncated_data() {
        let mut bytes = sample().encode_vectors();
        bytes.truncate(bytes.len() - 1);
        assert!(decode_vectors(&bytes).unwrap_err().contains("expected"));
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = sample().encode_vectors();
        bytes[0] = b'X';
        assert_eq!(decode_vectors(&bytes).unwrap_err(), "bad magic bytes");
    }

    #[test]
    fn each_file_has_its_own_temporary() {
        let dir = Path::new("/models/vector_index");
        let vectors = temp_path(&dir.join(VECTORS_FILE));
        let metadata = temp_path(&dir.join(METADATA_FILE));
        assert_ne!(vectors, metadata);
        assert_eq!(vectors, dir.join("index.vectors.tmp"));

        let temp = tempfile::tempdir().unwrap();
        sample().save(temp.path()).unwrap();
        let mut names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, [METADATA_FILE, VECTORS_FILE]);
    }
}
