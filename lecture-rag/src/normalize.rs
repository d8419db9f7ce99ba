//! Boilerplate removal for text extracted from slide decks.
//!
//! Slides repeat the same footer on every page (page counters, the academic
//! year). Left in place these dominate short chunks and pull unrelated pages
//! together in embedding space.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bpage\s*\d+(?:\s*(?:/|of)\s*\d+)?\b")
        .expect("unreachable error: invalid page marker pattern")
});

/// Candidate year ranges; the trailing group catches dates such as `2024-01-15`.
static YEAR_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})\s?[-–/]\s?(\d{4}|\d{2})\b([-/]\d)?")
        .expect("unreachable error: invalid year range pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("unreachable error: invalid whitespace pattern"));

/// Normalize extracted page text.
///
/// Removes page-number markers (`PAGE 12`, `Page 3 of 40`), academic-year
/// ranges of consecutive years (`2024-25`, `2024-2025`, `2023/24`), collapses whitespace runs to a single
/// space and trims the result.
///
/// Removal is repeated until nothing changes, so the function is idempotent
/// even when deleting one marker brings the pieces of another together.
///
/// # Example
///
/// ```rust
/// use lecture_rag::normalize;
///
/// assert_eq!(normalize("  Attention\n\nPAGE 12  2024-25 "), "Attention");
/// ```
pub fn normalize(text: &str) -> String {
    let mut current = collapse_whitespace(text);
    loop {
        let next = collapse_whitespace(&strip_markers(&current));
        if next == current {
            return next;
        }
        current = next;
    }
}

fn strip_markers(text: &str) -> String {
    let without_pages = PAGE_MARKER.replace_all(text, " ");
    let without_years = YEAR_RANGE.replace_all(&without_pages, |caps: &Captures<'_>| {
        if is_academic_year(caps) { " ".to_string() } else { caps[0].to_string() }
    });
    match without_years {
        Cow::Borrowed(_) => without_pages.into_owned(),
        Cow::Owned(s) => s,
    }
}

/// The second year must follow the first; ISO dates and longer spans stay.
fn is_academic_year(caps: &Captures<'_>) -> bool {
    if caps.get(3).is_some() {
        return false;
    }
    let (Ok(start), Ok(end)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
        return false;
    };
    if caps[2].len() == 4 { end == start + 1 } else { end == (start + 1) % 100 }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
