//! Remote artifact storage.
//!
//! [`ArtifactStore`] is the seam between the build environment and the
//! serving environment: the builder pushes the persisted index, the query
//! engine pulls it, and the data pipeline pulls raw PDFs. Object keys are
//! `/`-separated and relative to the configured bucket.
//!
//! [`FsArtifactStore`] maps a bucket to a directory under a storage root,
//! which covers mounted buckets and local mirrors.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{RagError, Result};
use crate::index::INDEX_FILES;
use crate::loader::is_pdf;

/// Durable storage for index artifacts and raw documents.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// A short name for logs and errors, e.g. `fs:/mnt/buckets/g1-data`.
    fn name(&self) -> &str;

    /// List all keys under `prefix`, sorted.
    ///
    /// A prefix with nothing under it yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Copy the object at `key` to the local file `dest`.
    ///
    /// Returns [`RagError::ArtifactNotFound`] if the key does not exist and
    /// [`RagError::RemoteTransport`] for any other failure.
    async fn download(&self, key: &str, dest: &Path) -> Result<()>;

    /// Store the local file `src` under `key`, replacing any existing object.
    async fn upload(&self, src: &Path, key: &str) -> Result<()>;
}

/// Join a prefix and a name into an object key.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() { name.to_string() } else { format!("{prefix}/{name}") }
}

/// An [`ArtifactStore`] backed by a local (or mounted) directory.
///
/// The bucket is the directory `root/bucket`; a missing bucket directory is
/// reported as a transport error, distinct from a missing object.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    bucket_dir: PathBuf,
    name: String,
}

impl FsArtifactStore {
    /// Create a store for `bucket` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the bucket name is empty or is
    /// not a plain directory name.
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Result<Self> {
        if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(RagError::ConfigError(format!("invalid bucket name '{bucket}'")));
        }
        let bucket_dir = root.into().join(bucket);
        let name = format!("fs:{}", bucket_dir.display());
        Ok(Self { bucket_dir, name })
    }

    fn ensure_bucket(&self) -> Result<()> {
        if self.bucket_dir.is_dir() {
            Ok(())
        } else {
            Err(self.transport(format!("bucket directory {} not found", self.bucket_dir.display())))
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || !is_plain_relative(relative) {
            return Err(RagError::ConfigError(format!("invalid object key '{key}'")));
        }
        Ok(self.bucket_dir.join(relative))
    }

    fn transport(&self, message: String) -> RagError {
        RagError::RemoteTransport { backend: self.name.clone(), message }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_bucket()?;
        let prefix = prefix.trim_matches('/').to_string();
        let bucket_dir = self.bucket_dir.clone();
        let start = if prefix.is_empty() { bucket_dir.clone() } else { self.object_path(&prefix)? };

        let keys = tokio::task::spawn_blocking(move || {
            if !start.is_dir() {
                return Vec::new();
            }
            let mut keys: Vec<String> = WalkDir::new(&start)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(&bucket_dir).ok()?;
                    let parts: Vec<_> =
                        relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                    Some(parts.join("/"))
                })
                .collect();
            keys.sort();
            keys
        })
        .await
        .map_err(|e| self.transport(format!("listing task failed: {e}")))?;

        debug!(store = %self.name, prefix = %prefix, key_count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        self.ensure_bucket()?;
        let source = self.object_path(key)?;
        if !source.is_file() {
            return Err(RagError::ArtifactNotFound { location: format!("{}/{key}", self.name) });
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| RagError::io(parent, e))?;
        }
        tokio::fs::copy(&source, dest).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RagError::ArtifactNotFound { location: format!("{}/{key}", self.name) }
            } else {
                self.transport(format!("failed to fetch '{key}': {e}"))
            }
        })?;
        debug!(store = %self.name, key, dest = %dest.display(), "downloaded object");
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<()> {
        self.ensure_bucket()?;
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.transport(format!("failed to create '{key}': {e}")))?;
        }
        tokio::fs::copy(src, &target)
            .await
            .map_err(|e| self.transport(format!("failed to store '{key}': {e}")))?;
        debug!(store = %self.name, key, src = %src.display(), "uploaded object");
        Ok(())
    }
}

/// Fetch the two index files under `prefix` into `dest_dir`.
///
/// Index files already in `dest_dir` are removed first so a failed fetch can
/// never leave a stale file paired with a fresh one.
///
/// # Errors
///
/// Returns [`RagError::ArtifactNotFound`] if either file is missing
/// remotely, [`RagError::RemoteTransport`] if storage cannot be reached.
pub async fn pull_index(store: &dyn ArtifactStore, prefix: &str, dest_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| RagError::io(dest_dir, e))?;
    for name in INDEX_FILES {
        let path = dest_dir.join(name);
        if path.exists() {
            tokio::fs::remove_file(&path).await.map_err(|e| RagError::io(&path, e))?;
        }
    }

    info!(store = store.name(), prefix, dest = %dest_dir.display(), "fetching index artifact");
    for name in INDEX_FILES {
        store.download(&object_key(prefix, name), &dest_dir.join(name)).await?;
    }
    Ok(())
}

/// Upload every file under `src_dir` to `prefix`, keeping relative paths.
///
/// Returns the number of files uploaded.
///
/// # Errors
///
/// Returns [`RagError::ArtifactNotFound`] if `src_dir` does not hold a
/// complete index, or the first upload error.
pub async fn push_index(store: &dyn ArtifactStore, prefix: &str, src_dir: &Path) -> Result<usize> {
    for name in INDEX_FILES {
        let path = src_dir.join(name);
        if !path.is_file() {
            return Err(RagError::ArtifactNotFound { location: path.display().to_string() });
        }
    }

    let mut files: Vec<PathBuf> = WalkDir::new(src_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    // Metadata goes last: it names the checksum of the vectors it belongs to.
    files.sort_by_key(|p| (p.ends_with(crate::index::METADATA_FILE), p.clone()));

    for path in &files {
        let relative = path.strip_prefix(src_dir).map_err(|e| RagError::io(path, e))?;
        let parts: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
        store.upload(path, &object_key(prefix, &parts.join("/"))).await?;
    }

    info!(store = store.name(), prefix, file_count = files.len(), "published index artifact");
    Ok(files.len())
}

/// Download every `.pdf` under `prefix` into `dest_dir`, flattening paths.
///
/// PDFs already in `dest_dir` are removed first so the local corpus mirrors
/// the remote one. Returns the number of files downloaded.
///
/// # Errors
///
/// Returns [`RagError::RemoteTransport`] if storage cannot be reached.
pub async fn pull_documents(
    store: &dyn ArtifactStore,
    prefix: &str,
    dest_dir: &Path,
) -> Result<usize> {
    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| RagError::io(dest_dir, e))?;
    let mut entries = tokio::fs::read_dir(dest_dir).await.map_err(|e| RagError::io(dest_dir, e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| RagError::io(dest_dir, e))? {
        let path = entry.path();
        if path.is_file() && is_pdf(&path) {
            tokio::fs::remove_file(&path).await.map_err(|e| RagError::io(&path, e))?;
        }
    }

    let keys = store.list(prefix).await?;
    let mut downloaded = 0;
    for key in keys.iter().filter(|k| is_pdf(Path::new(k.as_str()))) {
        let Some(file_name) = key.rsplit('/').next().filter(|n| !n.is_empty()) else {
            continue;
        };
        store.download(key, &dest_dir.join(file_name)).await?;
        downloaded += 1;
    }

    if downloaded == 0 {
        warn!(store = store.name(), prefix, "no PDF documents found");
    } else {
        info!(store = store.name(), prefix, file_count = downloaded, "downloaded documents");
    }
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store(root: &Path) -> FsArtifactStore {
        fs::create_dir_all(root.join("g1-data")).unwrap();
        FsArtifactStore::new(root, "g1-data").unwrap()
    }

    #[test]
    fn object_keys_join_cleanly() {
        assert_eq!(object_key("artifacts/vector_index/", "index.json"), "artifacts/vector_index/index.json");
        assert_eq!(object_key("", "index.json"), "index.json");
    }

    #[test]
    fn bucket_names_must_be_plain() {
        assert!(FsArtifactStore::new("/tmp", "").is_err());
        assert!(FsArtifactStore::new("/tmp", "../etc").is_err());
        assert!(FsArtifactStore::new("/tmp", "a/b").is_err());
    }

    #[tokio::test]
    async fn missing_bucket_is_a_transport_error() {
        let temp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(temp.path(), "absent").unwrap();
        let err = store.list("raw").await.unwrap_err();
        assert!(matches!(err, RagError::RemoteTransport { .. }));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let err = store.download("nope/index.json", &temp.path().join("out")).await.unwrap_err();
        assert!(matches!(err, RagError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn keys_escaping_the_bucket_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let err = store.download("../secret", &temp.path().join("out")).await.unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[tokio::test]
    async fn upload_then_list_and_download() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let src = temp.path().join("local.txt");
        fs::write(&src, "payload").unwrap();

        store.upload(&src, "a/b/c.txt").await.unwrap();
        assert_eq!(store.list("a").await.unwrap(), ["a/b/c.txt"]);
        assert!(store.list("other").await.unwrap().is_empty());

        let dest = temp.path().join("copy/c.txt");
        store.download("a/b/c.txt", &dest).await.unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "payload");
    }

    #[tokio::test]
    async fn pull_documents_takes_only_pdfs_and_replaces_old_ones() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let bucket = temp.path().join("g1-data/raw/sub");
        fs::create_dir_all(&bucket).unwrap();
        fs::write(bucket.join("Lecture01.pdf"), "pdf").unwrap();
        fs::write(bucket.join("readme.md"), "md").unwrap();

        let dest = temp.path().join("data/raw");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("Stale.pdf"), "old").unwrap();
        fs::write(dest.join("keep.txt"), "mine").unwrap();

        let count = pull_documents(&store, "raw", &dest).await.unwrap();
        assert_eq!(count, 1);
        assert!(dest.join("Lecture01.pdf").is_file());
        assert!(!dest.join("Stale.pdf").exists());
        assert!(dest.join("keep.txt").is_file());
    }

    #[tokio::test]
    async fn push_requires_a_complete_index() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let src = temp.path().join("models/index");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.vectors"), "v").unwrap();

        let err = push_index(&store, "artifacts/vector_index", &src).await.unwrap_err();
        assert!(matches!(err, RagError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn push_then_pull_round_trips_files() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let src = temp.path().join("models/index");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.vectors"), "v").unwrap();
        fs::write(src.join("index.json"), "m").unwrap();

        assert_eq!(push_index(&store, "artifacts/vector_index", &src).await.unwrap(), 2);

        let dest = temp.path().join("cache");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("index.json"), "stale").unwrap();
        pull_index(&store, "artifacts/vector_index", &dest).await.unwrap();
        assert_eq!(fs::read_to_string(dest.join("index.json")).unwrap(), "m");
        assert_eq!(fs::read_to_string(dest.join("index.vectors")).unwrap(), "v");
    }

    #[tokio::test]
    async fn failed_pull_leaves_no_stale_files() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(temp.path());
        let dest = temp.path().join("cache");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("index.vectors"), "stale").unwrap();

        let err = pull_index(&store, "artifacts/vector_index", &dest).await.unwrap_err();
        assert!(matches!(err, RagError::ArtifactNotFound { .. }));
        assert!(!dest.join("index.vectors").exists());
    }
}
