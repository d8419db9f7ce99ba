//! Resolution of the single configuration the library runs with.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML config file,
//! environment variables, command-line flags. Resolved once at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use lecture_rag::{
    CompletionClient, FsArtifactStore, IndexBuilder, IndexLocation, PromptTemplate, RagConfig,
    RagEngine, openai::OpenAICompatibleClient,
};
use serde::Deserialize;

use crate::cli::GlobalArgs;

const DEFAULT_CONFIG_FILE: &str = "lecture-rag.toml";

/// Local working paths.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    /// Raw PDF documents.
    pub raw_dir: PathBuf,
    /// Build output.
    pub index_dir: PathBuf,
    /// Where a fetched index is kept while serving.
    pub cache_dir: PathBuf,
    /// Evaluation report.
    pub report: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            index_dir: PathBuf::from("models/vector_index"),
            cache_dir: std::env::temp_dir().join("lecture-rag-index"),
            report: PathBuf::from("data/processed/evaluation_report.csv"),
        }
    }
}

/// The config file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    storage_root: Option<PathBuf>,
    prompt_template: Option<String>,
    paths: Paths,
    rag: RagConfig,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rag: RagConfig,
    pub storage_root: PathBuf,
    pub paths: Paths,
    pub prompt: PromptTemplate,
}

impl Settings {
    /// Resolve settings from the config file and the global arguments.
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => read_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => read_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => SettingsFile::default(),
        };
        Self::from_parts(file, args)
    }

    fn from_parts(file: SettingsFile, args: &GlobalArgs) -> Result<Self> {
        let mut rag = file.rag;
        if let Some(bucket) = &args.bucket {
            rag.storage.bucket = bucket.clone();
        }
        if let Some(region) = &args.region {
            rag.storage.region = Some(region.clone());
        }
        if let Some(key) = &args.api_key {
            rag.completion.credential = Some(key.clone());
        }
        if let Some(key) = &args.embedding_api_key {
            rag.embedding.credential = Some(key.clone());
        }
        if let Some(model) = &args.model {
            rag.completion.model = model.clone();
        }
        if let Some(top_k) = args.top_k {
            rag.top_k = top_k;
        }
        rag.validate()?;

        let prompt = match file.prompt_template {
            Some(template) => PromptTemplate::new(template)?,
            None => PromptTemplate::default(),
        };

        Ok(Self {
            rag,
            storage_root: args
                .storage_root
                .clone()
                .or(file.storage_root)
                .unwrap_or_else(|| PathBuf::from("storage")),
            paths: file.paths,
            prompt,
        })
    }

    /// The artifact store for the configured bucket.
    pub fn store(&self) -> Result<Arc<FsArtifactStore>> {
        self.rag.storage.validate()?;
        Ok(Arc::new(FsArtifactStore::new(&self.storage_root, &self.rag.storage.bucket)?))
    }

    pub fn index_builder(&self) -> Result<IndexBuilder> {
        Ok(IndexBuilder::builder().config(self.rag.clone()).build()?)
    }

    pub fn completion_client(&self) -> Result<Arc<dyn CompletionClient>> {
        Ok(Arc::new(OpenAICompatibleClient::new(&self.rag.completion)?))
    }

    /// A query engine reading either the local build output or the remote index.
    pub fn engine(&self, local: bool) -> Result<RagEngine> {
        let location = if local {
            IndexLocation::Local(self.paths.index_dir.clone())
        } else {
            IndexLocation::Remote {
                store: self.store()?,
                prefix: self.rag.storage.index_prefix.clone(),
                cache_dir: self.paths.cache_dir.clone(),
            }
        };

        Ok(RagEngine::builder()
            .config(self.rag.clone())
            .completion(self.completion_client()?)
            .location(location)
            .prompt(self.prompt.clone())
            .build()?)
    }
}

fn read_file(path: &Path) -> Result<SettingsFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = Settings::from_parts(SettingsFile::default(), &GlobalArgs::default()).unwrap();
        assert_eq!(settings.rag, RagConfig::default());
        assert_eq!(settings.storage_root, PathBuf::from("storage"));
        assert_eq!(settings.paths.raw_dir, PathBuf::from("data/raw"));
    }

    #[test]
    fn flags_override_the_file() {
        let file: SettingsFile = toml::from_str(
            r#"
            storage_root = "/mnt/buckets"

            [paths]
            index_dir = "out/index"

            [rag]
            top_k = 6

            [rag.storage]
            bucket = "from-file"

            [rag.embedding]
            backend = "hashing"
            dimensions = 256

            [rag.completion]
            model = "file-model"
            credential = "file-key"
            "#,
        )
        .unwrap();
        let args = GlobalArgs {
            bucket: Some("g1-data".into()),
            api_key: Some("flag-key".into()),
            top_k: Some(2),
            ..Default::default()
        };

        let settings = Settings::from_parts(file, &args).unwrap();
        assert_eq!(settings.rag.storage.bucket, "g1-data");
        assert_eq!(settings.rag.completion.credential.as_deref(), Some("flag-key"));
        assert_eq!(settings.rag.completion.model, "file-model");
        assert_eq!(settings.rag.top_k, 2);
        assert_eq!(settings.storage_root, PathBuf::from("/mnt/buckets"));
        assert_eq!(settings.paths.index_dir, PathBuf::from("out/index"));
        assert_eq!(settings.rag.embedding.backend, lecture_rag::EmbeddingBackend::Hashing);
        assert_eq!(settings.rag.embedding.dimensions, 256);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = GlobalArgs { top_k: Some(0), ..Default::default() };
        assert!(Settings::from_parts(SettingsFile::default(), &args).is_err());

        let file: SettingsFile = toml::from_str("prompt_template = \"no placeholders\"").unwrap();
        assert!(Settings::from_parts(file, &GlobalArgs::default()).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<SettingsFile>("bukket = \"typo\"").is_err());
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lecture-rag.toml");
        std::fs::write(&path, "[rag.storage]\nbucket = \"g1-data\"\n").unwrap();

        let args = GlobalArgs { config: Some(path), ..Default::default() };
        let settings = Settings::resolve(&args).unwrap();
        assert_eq!(settings.rag.storage.bucket, "g1-data");
        assert!(settings.store().is_ok());
    }

    #[test]
    fn store_requires_a_bucket() {
        let settings = Settings::from_parts(SettingsFile::default(), &GlobalArgs::default()).unwrap();
        assert!(settings.store().is_err());
    }
}
