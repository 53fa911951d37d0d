#![forbid(unsafe_code)]

//! Completion candidates and the candidate listing.
//!
//! The engine owns only the UI side of completion: a host callback
//! populates a [`Completions`] set, and the editor inserts prefixes,
//! prints the listing, and rotates candidates. Each entry carries the
//! text shown in the listing, the full replacement for the edit line,
//! and where the cursor lands inside that replacement.

use crate::encoding::Encoding;

/// Candidate counts at or above this ask for confirmation before listing.
pub(crate) const LISTING_PROMPT_THRESHOLD: usize = 100;

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Short text shown in the candidate listing.
    pub suggestion: String,
    /// Full replacement for the edit line when this candidate is chosen.
    pub replacement: String,
    /// Cursor byte offset within the replacement (clamped on use).
    pub cursor: usize,
}

/// The candidate set a completion callback fills in.
#[derive(Debug, Default)]
pub struct Completions {
    entries: Vec<Completion>,
}

impl Completions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a candidate. Strings are copied into the set.
    pub fn add(&mut self, suggestion: impl Into<String>, replacement: impl Into<String>, cursor: usize) {
        self.entries.push(Completion {
            suggestion: suggestion.into(),
            replacement: replacement.into(),
            cursor,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[Completion] {
        &self.entries
    }

    /// Order candidates for listing and rotation.
    pub(crate) fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.suggestion.cmp(&b.suggestion));
    }

    /// Widest suggestion in display columns. Cached by the editor for the
    /// lifetime of one COMPLETION episode.
    pub(crate) fn max_suggestion_width(&self, encoding: &dyn Encoding) -> usize {
        self.entries
            .iter()
            .map(|c| encoding.str_width(c.suggestion.as_bytes()))
            .max()
            .unwrap_or(0)
    }
}

/// Longest common prefix of all replacements. Empty set yields `None`.
pub(crate) fn common_prefix(entries: &[Completion]) -> Option<Vec<u8>> {
    let first = entries.first()?.replacement.as_bytes();
    let mut len = first.len();
    for entry in &entries[1..] {
        let other = entry.replacement.as_bytes();
        let common = first
            .iter()
            .take(len)
            .zip(other)
            .take_while(|(a, b)| a == b)
            .count();
        len = common;
        if len == 0 {
            break;
        }
    }
    if len == 0 {
        None
    } else {
        Some(first[..len].to_vec())
    }
}

/// The part of `prefix` not already typed: drop the longest suffix of
/// `before_cursor` that is also a prefix of `prefix`, and return the rest.
pub(crate) fn prefix_extension<'a>(prefix: &'a [u8], before_cursor: &[u8]) -> &'a [u8] {
    let max = prefix.len().min(before_cursor.len());
    for matched in (1..=max).rev() {
        if before_cursor.ends_with(&prefix[..matched]) {
            return &prefix[matched..];
        }
    }
    prefix
}

/// Column-major listing layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListingLayout {
    /// Width of one cell (widest suggestion plus two spaces).
    pub(crate) cell_width: usize,
    pub(crate) columns: usize,
    pub(crate) rows: usize,
}

pub(crate) fn listing_layout(count: usize, max_width: usize, term_cols: usize) -> ListingLayout {
    let cell_width = max_width + 2;
    let columns = (term_cols / cell_width.max(1)).max(1);
    let rows = count.div_ceil(columns);
    ListingLayout {
        cell_width,
        columns,
        rows,
    }
}

/// Render the candidate listing, column-major, each row CRLF-terminated.
/// Starts with a CRLF so the listing opens on a fresh row.
pub(crate) fn render_listing(
    out: &mut Vec<u8>,
    completions: &Completions,
    max_width: usize,
    term_cols: usize,
    encoding: &dyn Encoding,
) {
    let entries = completions.entries();
    let layout = listing_layout(entries.len(), max_width, term_cols);

    out.extend_from_slice(b"\r\n");
    for row in 0..layout.rows {
        for col in 0..layout.columns {
            let index = col * layout.rows + row;
            let Some(entry) = entries.get(index) else {
                break;
            };
            out.extend_from_slice(entry.suggestion.as_bytes());
            let width = encoding.str_width(entry.suggestion.as_bytes());
            for _ in width..layout.cell_width {
                out.push(b' ');
            }
        }
        out.extend_from_slice(b"\r\n");
    }
}

/// Confirmation prompt shown before a large listing.
pub(crate) fn listing_prompt(count: usize) -> String {
    format!("\r\nDisplay all {count} possibilities? (y or n) ")
}
