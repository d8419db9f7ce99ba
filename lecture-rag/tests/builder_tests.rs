//! End-to-end tests for building an index from a documents directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lecture_rag::{
    DocumentLoader, HashingEmbeddingProvider, IndexBuilder, PageExtractor, RagConfig, RagError,
    Result, VectorIndex,
};

/// Reads a file as UTF-8 with pages separated by form feeds.
struct PlainTextPages;

impl PageExtractor for PlainTextPages {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let file = path.file_name().unwrap().to_string_lossy().into_owned();
        let text = fs::read_to_string(path)
            .map_err(|e| RagError::IngestError { file: file.clone(), message: e.to_string() })?;
        if text.starts_with("%CORRUPT") {
            return Err(RagError::IngestError { file, message: "broken xref table".into() });
        }
        Ok(text.split('\u{c}').map(str::to_string).collect())
    }
}

fn builder(config: RagConfig) -> IndexBuilder {
    IndexBuilder::builder()
        .config(config)
        .loader(DocumentLoader::new(Arc::new(PlainTextPages)))
        .embedder(Arc::new(HashingEmbeddingProvider::new(384)))
        .batch_size(3)
        .build()
        .unwrap()
}

#[tokio::test]
async fn empty_directory_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let raw = temp.path().join("raw");
    fs::create_dir(&raw).unwrap();
    let out = temp.path().join("models/vector_index");

    let err = builder(RagConfig::default()).build_vector_store(&raw, &out).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus(_)));
    assert!(err.hint().is_some());
    assert!(!out.exists());
    assert!(!temp.path().join("models").exists());
}

#[tokio::test]
async fn missing_directory_is_an_empty_corpus() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let err = builder(RagConfig::default())
        .build_vector_store(&temp.path().join("absent"), &out)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus(_)));
    assert!(!out.exists());
}

#[tokio::test]
async fn boilerplate_only_pages_are_an_empty_corpus() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("Scan.pdf"), "PAGE 1\u{c}  2024-25  \u{c}\n\n").unwrap();
    let out = temp.path().join("out");

    let err = builder(RagConfig::default()).build_vector_store(temp.path(), &out).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus(_)));
    assert!(!out.exists());
}

#[tokio::test]
async fn only_unreadable_files_is_an_empty_corpus() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("Broken.pdf"), "%CORRUPT").unwrap();
    let out = temp.path().join("out");

    let err = builder(RagConfig::default()).build_vector_store(temp.path(), &out).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus(_)));
}

#[tokio::test]
async fn builds_and_reports_a_course_corpus() {
    let temp = tempfile::tempdir().unwrap();
    let raw = temp.path().join("raw");
    fs::create_dir(&raw).unwrap();
    fs::write(
        raw.join("Lecture01.pdf"),
        "Introduction to NLP\nPage 1 of 2\u{c}A transformer uses self-attention.\nPage 2 of 2",
    )
    .unwrap();
    fs::write(raw.join("Lecture02.pdf"), "Tokenization splits text into tokens. 2024-25").unwrap();
    fs::write(raw.join("Broken.pdf"), "%CORRUPT").unwrap();
    fs::write(raw.join("notes.txt"), "not a slide deck").unwrap();
    let out = temp.path().join("models/vector_index");

    let report = builder(RagConfig::default()).build_vector_store(&raw, &out).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.pages, 3);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].file, "Broken.pdf");
    assert_eq!(report.dimensions, 384);
    assert_eq!(report.model_id, "hashing-bow-fnv1a-384");
    assert_eq!(report.output_dir, out);

    let index = VectorIndex::load(&out).unwrap();
    assert_eq!(index.len(), 3);
    let texts: Vec<_> = index.chunks().iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        ["Introduction to NLP", "A transformer uses self-attention.", "Tokenization splits text into tokens."]
    );
    assert_eq!(index.chunks()[1].page, 2);
    assert_eq!(index.chunks()[1].source, "Lecture01.pdf");
}

#[tokio::test]
async fn small_chunks_overlap_across_batches() {
    let temp = tempfile::tempdir().unwrap();
    let words: Vec<String> = (0..60).map(|i| format!("word{i}")).collect();
    fs::write(temp.path().join("Long.pdf"), words.join(" ")).unwrap();
    let config = RagConfig::builder().chunk_size(40).chunk_overlap(10).build().unwrap();
    let out = temp.path().join("out");

    let report = builder(config).build_vector_store(temp.path(), &out).await.unwrap();
    assert!(report.chunks > 3, "expected several embedding batches");

    let index = VectorIndex::load(&out).unwrap();
    assert!(index.chunks().iter().all(|c| c.text.chars().count() <= 40));
    assert_eq!(index.len(), report.chunks);
}
