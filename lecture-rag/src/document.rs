//! Data types for documents, chunks, and search results.

use serde::{Deserialize, Serialize};

/// One page of extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// The source file name, e.g. `Lecture01.pdf`.
    pub source: String,
    /// 1-based page number within the source file.
    pub number: u32,
    /// The page text.
    pub text: String,
}

/// A source document as read from disk: a file name and its pages.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// The source file name.
    pub source: String,
    /// Pages in file order.
    pub pages: Vec<Page>,
}

impl RawDocument {
    /// Build a document from extracted page texts, numbering pages from 1.
    pub fn from_pages(source: impl Into<String>, texts: Vec<String>) -> Self {
        let source = source.into();
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page { source: source.clone(), number: i as u32 + 1, text })
            .collect();
        Self { source, pages }
    }
}

/// A bounded span of normalized page text plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Identifier of the form `{source}#p{page}_{index}`.
    pub id: String,
    /// The chunk text, an exact substring of the normalized page.
    pub text: String,
    /// The source file name.
    pub source: String,
    /// The page the chunk was cut from.
    pub page: u32,
    /// Byte offset of `text` within the normalized page.
    pub offset: usize,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity with the query (higher is more relevant).
    pub score: f32,
}

/// The outcome of one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// The generated answer.
    pub answer: String,
    /// Source file names backing the answer, each listed once.
    pub sources: Vec<String>,
    /// The retrieved chunks, nearest first.
    pub chunks: Vec<SearchResult>,
}

/// Deduplicate the source file names of retrieved chunks, keeping the order
/// in which each first appears.
pub fn unique_sources<'a, I>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        if !sources.iter().any(|s| s == &chunk.source) {
            sources.push(chunk.source.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, page: u32) -> Chunk {
        Chunk {
            id: format!("{source}#p{page}_0"),
            text: "text".into(),
            source: source.into(),
            page,
            offset: 0,
        }
    }

    #[test]
    fn pages_are_numbered_from_one() {
        let doc = RawDocument::from_pages("Lecture01.pdf", vec!["a".into(), "b".into()]);
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.pages[1].number, 2);
        assert!(doc.pages.iter().all(|p| p.source == "Lecture01.pdf"));
    }

    #[test]
    fn sources_are_listed_once() {
        let chunks = [chunk("a.pdf", 1), chunk("b.pdf", 1), chunk("a.pdf", 2), chunk("a.pdf", 3)];
        assert_eq!(unique_sources(&chunks), vec!["a.pdf".to_string(), "b.pdf".to_string()]);
    }
}
