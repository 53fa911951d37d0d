#![forbid(unsafe_code)]

//! Bounded history of previously accepted lines.
//!
//! Entries are ordered oldest to newest; when the cap is reached the
//! oldest entry is dropped on append. While an edit session is active the
//! newest entry is a sentinel holding the line being typed, so browsing
//! away and back preserves in-progress edits. The sentinel is managed by
//! the editor, not by hosts.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Default entry cap.
pub(crate) const DEFAULT_MAX_LEN: usize = 100;

/// Ordered line store with a maximum length.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<String>,
    max_len: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_len: DEFAULT_MAX_LEN,
        }
    }

    /// Number of stored entries (including the sentinel while editing).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a line, dropping the oldest entry when full.
    pub fn add(&mut self, line: impl Into<String>) {
        if self.max_len == 0 {
            return;
        }
        if self.entries.len() >= self.max_len {
            let excess = self.entries.len() + 1 - self.max_len;
            self.entries.drain(..excess);
        }
        self.entries.push(line.into());
    }

    /// Change the cap, dropping oldest entries if shrinking below the
    /// current length.
    pub fn set_max(&mut self, max_len: usize) {
        self.max_len = max_len;
        if self.entries.len() > max_len {
            let excess = self.entries.len() - max_len;
            self.entries.drain(..excess);
        }
    }

    /// Entry `index` steps back from the newest (0 = newest).
    #[must_use]
    pub(crate) fn from_newest(&self, index: usize) -> Option<&str> {
        if index >= self.entries.len() {
            return None;
        }
        let i = self.entries.len() - 1 - index;
        self.entries.get(i).map(String::as_str)
    }

    /// Overwrite entry `index` steps back from the newest. Browsed
    /// entries are snapshotted through this before moving away.
    pub(crate) fn set_from_newest(&mut self, index: usize, text: String) {
        if index >= self.entries.len() {
            return;
        }
        let i = self.entries.len() - 1 - index;
        self.entries[i] = text;
    }

    /// Install the sentinel "current line" entry for a new session.
    pub(crate) fn push_sentinel(&mut self) {
        self.add(String::new());
    }

    /// Release the sentinel when the session leaves editing.
    pub(crate) fn pop_sentinel(&mut self) {
        self.entries.pop();
    }

    /// Write one entry per line, LF-terminated, no escaping.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for entry in &self.entries {
            out.write_all(entry.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(entries = self.entries.len(), "history saved");
        Ok(())
    }

    /// Load entries from a file, appending to the current store. Lenient:
    /// the trailing CR (if any) of each line is stripped and empty lines
    /// become empty entries.
    pub fn load(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let mut line = line?;
            if line.ends_with('\r') {
                line.pop();
            }
            self.add(line);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(entries = self.entries.len(), "history loaded");
        Ok(())
    }
}
