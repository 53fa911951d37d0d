#![forbid(unsafe_code)]

//! Incremental reverse history search.
//!
//! While searching, the session shows a temporary prompt carrying the
//! query and displays the best match with the cursor placed just after
//! the matched substring. Repeating Ctrl-R steps to older matches;
//! shortening the query rewinds. The state lives inside the search mode
//! variant so it structurally cannot outlive the search.

use crate::history::History;

/// Mutable state of one reverse-search episode.
#[derive(Debug)]
pub(crate) struct SearchState {
    /// Query bytes typed so far.
    pub(crate) query: Vec<u8>,
    /// History index (steps back from newest) the search currently
    /// examines; grows toward older entries.
    pub(crate) current_index: usize,
    /// Whether the last search attempt matched.
    pub(crate) found: bool,
    /// Buffer contents at search entry, restored on cancel.
    pub(crate) saved_buffer: Vec<u8>,
    pub(crate) saved_cursor: usize,
    pub(crate) saved_history_index: usize,
}

impl SearchState {
    pub(crate) fn begin(buffer: &[u8], cursor: usize, history_index: usize) -> Self {
        Self {
            query: Vec::new(),
            current_index: history_index,
            found: false,
            saved_buffer: buffer.to_vec(),
            saved_cursor: cursor,
            saved_history_index: history_index,
        }
    }
}

/// The temporary prompt shown while searching.
pub(crate) fn search_prompt(query: &[u8]) -> String {
    format!(
        "(reverse-i-search`{}'): ",
        String::from_utf8_lossy(query)
    )
}

/// Rightmost occurrence of `needle` in `haystack`.
pub(crate) fn rightmost_match(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&start| &haystack[start..start + needle.len()] == needle)
}

/// Search from `from_index` toward older entries for the rightmost
/// occurrence of `query`. Returns the matching history index and the
/// byte offset just past the match (the cursor position to show).
pub(crate) fn search_backward(
    history: &History,
    from_index: usize,
    query: &[u8],
) -> Option<(usize, usize)> {
    let mut index = from_index;
    while let Some(entry) = history.from_newest(index) {
        if let Some(start) = rightmost_match(entry.as_bytes(), query) {
            return Some((index, start + query.len()));
        }
        index += 1;
    }
    None
}
