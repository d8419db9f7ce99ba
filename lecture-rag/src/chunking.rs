//! Page chunking.
//!
//! [`RecursiveChunker`] splits text hierarchically by an ordered separator
//! preference list (paragraph, line, sentence end, word, raw character cut)
//! and greedily merges the pieces back into overlapping chunks.
//!
//! Chunks are exact substrings of the page text and carry their byte offset,
//! so the regions that do not overlap their predecessor concatenate back to
//! the page.

use std::collections::VecDeque;
use std::ops::Range;

use crate::config::{RagConfig, default_separators};
use crate::document::{Chunk, Page};

/// A strategy for splitting pages into chunks.
pub trait Chunker: Send + Sync {
    /// Split a page into chunks.
    ///
    /// Returns an empty `Vec` if the page has no text. Every chunk inherits
    /// the page's source file name and page number.
    fn chunk(&self, page: &Page) -> Vec<Chunk>;

    /// Split a sequence of pages, preserving page order.
    fn chunk_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        pages.iter().flat_map(|page| self.chunk(page)).collect()
    }
}

/// Splits text at the most preferred separator that keeps pieces within
/// `chunk_size`, then merges pieces into chunks sharing up to `chunk_overlap`
/// characters with their predecessor.
///
/// Sizes are measured in characters. A segment that no separator can bring
/// under `chunk_size` is cut character by character, so no chunk is ever
/// longer than `chunk_size`.
///
/// # Example
///
/// ```rust,ignore
/// use lecture_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(800, 100);
/// let chunks = chunker.chunk(&page);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with the default separator list.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - maximum number of characters shared with the previous chunk
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap, separators: default_separators() }
    }

    /// Create a chunker from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap).with_separators(config.separators.clone())
    }

    /// Replace the separator preference list. `""` stands for a raw character cut.
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Compute chunk spans (byte ranges) over `text`.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        split_pieces(text, 0..text.len(), self.chunk_size, &self.separators, &mut pieces);
        self.merge(text, pieces)
    }

    fn merge(&self, text: &str, pieces: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut window_len = 0;

        for piece in pieces {
            let len = text[piece.clone()].chars().count();
            if window_len + len > self.chunk_size && !window.is_empty() {
                spans.push(window_span(&window));
                // Keep the tail of the emitted chunk as overlap for the next one.
                while window_len > self.chunk_overlap
                    || (window_len > 0 && window_len + len > self.chunk_size)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => window_len -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            window_len += len;
        }

        if !window.is_empty() {
            spans.push(window_span(&window));
        }
        spans
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

fn window_span(window: &VecDeque<(Range<usize>, usize)>) -> Range<usize> {
    match (window.front(), window.back()) {
        (Some((first, _)), Some((last, _))) => first.start..last.end,
        _ => 0..0,
    }
}

/// Break `range` of `text` into contiguous pieces of at most `size` characters.
fn split_pieces(
    text: &str,
    range: Range<usize>,
    size: usize,
    separators: &[String],
    out: &mut Vec<Range<usize>>,
) {
    let segment = &text[range.clone()];
    if segment.chars().count() <= size {
        out.push(range);
        return;
    }

    let usable = separators.iter().position(|s| s.is_empty() || segment.contains(s.as_str()));
    match usable {
        Some(i) if !separators[i].is_empty() => {
            let remaining = &separators[i + 1..];
            for piece in split_keeping_separator(segment, &separators[i]) {
                let absolute = range.start + piece.start..range.start + piece.end;
                split_pieces(text, absolute, size, remaining, out);
            }
        }
        // Raw cut: every character becomes a piece and the merge packs them.
        _ => {
            for (offset, c) in segment.char_indices() {
                let start = range.start + offset;
                out.push(start..start + c.len_utf8());
            }
        }
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<Range<usize>> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(start..end);
        start = end;
    }

    if start < text.len() {
        result.push(start..text.len());
    }

    result
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, page: &Page) -> Vec<Chunk> {
        if page.text.trim().is_empty() {
            return Vec::new();
        }

        self.split_spans(&page.text)
            .into_iter()
            .filter(|span| !page.text[span.clone()].trim().is_empty())
            .enumerate()
            .map(|(i, span)| Chunk {
                id: format!("{}#p{}_{i}", page.source, page.number),
                text: page.text[span.clone()].to_string(),
                source: page.source.clone(),
                page: page.number,
                offset: span.start,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> Page {
        Page { source: "Lecture01.pdf".into(), number: 2, text: text.into() }
    }

    fn reconstruct(text: &str, chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            let end = chunk.offset + chunk.text.len();
            if end > out.len() {
                out.push_str(&text[out.len().max(chunk.offset)..end]);
            }
        }
        out
    }

    #[test]
    fn short_page_is_one_chunk() {
        let chunks = RecursiveChunker::new(800, 100).chunk(&page("A transformer uses self-attention."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A transformer uses self-attention.");
        assert_eq!(chunks[0].source, "Lecture01.pdf");
        assert_eq!(chunks[0].page, 2);
        assert_eq!(chunks[0].id, "Lecture01.pdf#p2_0");
    }

    #[test]
    fn empty_page_has_no_chunks() {
        assert!(RecursiveChunker::new(10, 2).chunk(&page("")).is_empty());
        assert!(RecursiveChunker::new(10, 2).chunk(&page("   ")).is_empty());
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. Third one.";
        let chunks = RecursiveChunker::new(25, 0).chunk(&page(text));
        assert_eq!(chunks[0].text, "First sentence here.");
        assert_eq!(chunks[1].text, " Second sentence here.");
        assert_eq!(chunks[2].text, " Third one.");
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = RecursiveChunker::new(20, 8).chunk(&page(text));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_end = pair[0].offset + pair[0].text.len();
            assert!(pair[1].offset <= prev_end, "gap between chunks");
            assert!(pair[1].offset > pair[0].offset, "chunk did not advance");
            let shared = text[pair[1].offset..prev_end].chars().count();
            assert!(shared <= 8);
        }
        assert_eq!(reconstruct(text, &chunks), text);
    }

    #[test]
    fn unbreakable_word_is_cut_by_characters() {
        let text = "x".repeat(25);
        let chunks = RecursiveChunker::new(10, 3).chunk(&page(&text));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(chunks[0].text.len(), 10);
        // raw cuts overlap by exactly chunk_overlap characters
        assert_eq!(chunks[1].offset, 7);
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let text = "ééééééééééééééééééééé àààààààààààààààààààà";
        let chunks = RecursiveChunker::new(8, 2).chunk(&page(text));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 8));
        assert_eq!(reconstruct(text, &chunks), text);
    }

    #[test]
    fn separators_can_be_overridden() {
        let chunker = RecursiveChunker::new(12, 0).with_separators(vec![";".into(), "".into()]);
        let chunks = chunker.chunk(&page("one two;three four;five"));
        assert_eq!(chunks[0].text, "one two;");
        assert_eq!(chunks[1].text, "three four;");
        assert_eq!(chunks[2].text, "five");
    }

    #[test]
    fn chunk_pages_keeps_page_order_and_provenance() {
        let pages = vec![
            Page { source: "a.pdf".into(), number: 1, text: "first page".into() },
            Page { source: "b.pdf".into(), number: 1, text: "second page".into() },
        ];
        let chunks = RecursiveChunker::new(800, 100).chunk_pages(&pages);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "a.pdf");
        assert_eq!(chunks[1].source, "b.pdf");
    }
}
