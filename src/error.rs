#![forbid(unsafe_code)]

//! Error taxonomy for line-editing operations.
//!
//! Closed and Cancelled are part of the normal protocol between the editor
//! and its host (end-of-input and user interrupt), not failures; they are
//! still `Error` variants so that `read_line` has a single result channel.

use std::io;

/// Errors produced by the editor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input descriptor is not a terminal, or `TERM` names a terminal
    /// on the unsupported blacklist while raw-mode editing was required.
    #[error("input descriptor is not a usable terminal")]
    NoTty,

    /// Unrecoverable read or write failure. EINTR is always retried and
    /// EAGAIN in async mode becomes a pending step, so neither reaches
    /// this variant.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A caller-supplied argument was unusable (empty prompt buffer,
    /// zero-size history cap where an entry is required, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// End of input with an empty buffer: a read returned zero bytes, or
    /// the user pressed Ctrl-D on an empty line.
    #[error("input closed")]
    Closed,

    /// The user pressed Ctrl-C on an empty line, or the external cancel
    /// flag was set. The partial line is discarded.
    #[error("edit cancelled")]
    Cancelled,
}

impl Error {
    /// True for the two protocol-level terminations (Closed, Cancelled)
    /// that a host typically handles by exiting its prompt loop rather
    /// than reporting a failure.
    #[must_use]
    pub fn is_termination(&self) -> bool {
        matches!(self, Error::Closed | Error::Cancelled)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
