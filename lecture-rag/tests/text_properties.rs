//! Property tests for normalization and chunking.

use lecture_rag::{Chunker, Page, RecursiveChunker, normalize};
use proptest::prelude::*;

/// Slide-like text: words, punctuation, line breaks, footer noise and a few
/// multibyte characters.
fn arb_slide_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-zA-Z]{1,12}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => "[0-9]{1,4}",
            1 => Just("Page 3 of 12".to_string()),
            1 => Just("2024-25".to_string()),
            1 => "[éàüß]{1,5}",
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

fn page(text: String) -> Page {
    Page { source: "Lecture01.pdf".to_string(), number: 1, text }
}

mod prop_normalize {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn normalize_is_idempotent(text in arb_slide_text()) {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn output_has_single_spaces_and_no_padding(text in arb_slide_text()) {
            let out = normalize(&text);
            prop_assert_eq!(out.trim(), out.as_str());
            prop_assert!(!out.contains("  "));
            prop_assert!(!out.contains('\n'));
        }
    }

    #[test]
    fn strips_footer_boilerplate() {
        let text = "Recurrent networks\nPage 4 / 30\n\nGradients vanish  2023-2024";
        assert_eq!(normalize(text), "Recurrent networks Gradients vanish");
    }
}

mod prop_chunking {
    use super::*;

    fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
        (1usize..120).prop_flat_map(|size| (Just(size), 0..size))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_never_exceed_chunk_size(text in arb_slide_text(), (size, overlap) in arb_sizes()) {
            let chunks = RecursiveChunker::new(size, overlap).chunk(&page(text));
            for chunk in &chunks {
                prop_assert!(chunk.text.chars().count() <= size, "{:?} exceeds {}", chunk.text, size);
            }
        }

        #[test]
        fn chunks_are_substrings_at_their_offset(text in arb_slide_text(), (size, overlap) in arb_sizes()) {
            let chunks = RecursiveChunker::new(size, overlap).chunk(&page(text.clone()));
            for chunk in &chunks {
                prop_assert_eq!(&text[chunk.offset..chunk.offset + chunk.text.len()], chunk.text.as_str());
                prop_assert_eq!(chunk.source.as_str(), "Lecture01.pdf");
                prop_assert!(!chunk.text.trim().is_empty());
            }
        }

        #[test]
        fn every_non_whitespace_character_is_covered(text in arb_slide_text(), (size, overlap) in arb_sizes()) {
            let chunks = RecursiveChunker::new(size, overlap).chunk(&page(text.clone()));
            let mut covered = vec![false; text.len()];
            for chunk in &chunks {
                covered[chunk.offset..chunk.offset + chunk.text.len()].iter_mut().for_each(|c| *c = true);
            }
            for (i, c) in text.char_indices() {
                prop_assert!(c.is_whitespace() || covered[i], "byte {} ({:?}) not in any chunk", i, c);
            }
        }

        #[test]
        fn overlap_with_predecessor_is_bounded(text in arb_slide_text(), (size, overlap) in arb_sizes()) {
            let chunks = RecursiveChunker::new(size, overlap).chunk(&page(text.clone()));
            for pair in chunks.windows(2) {
                let prev_end = pair[0].offset + pair[0].text.len();
                prop_assert!(pair[1].offset > pair[0].offset);
                if pair[1].offset < prev_end {
                    let shared = text[pair[1].offset..prev_end].chars().count();
                    prop_assert!(shared <= overlap);
                }
            }
        }
    }

    #[test]
    fn default_chunker_uses_course_sizes() {
        let text = "word ".repeat(400);
        let chunks = RecursiveChunker::default().chunk(&page(text));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 800));
    }
}
