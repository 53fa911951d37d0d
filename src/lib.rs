#![forbid(unsafe_code)]

//! An embeddable interactive line editor for character-cell terminals.
//!
//! `promptline` presents a prompt, accepts one logical line with inline
//! editing, history navigation, tab completion and incremental reverse
//! search, and returns the finished line. It speaks a deliberately small
//! subset of ECMA-48 to the terminal and assumes a byte-oriented Unix
//! descriptor pair.
//!
//! # Quick start
//!
//! ```no_run
//! use promptline::Editor;
//!
//! let mut editor = Editor::new();
//! editor.history_add("previous command");
//! match editor.read_line("> ") {
//!     Ok(line) => println!("got: {line}"),
//!     Err(promptline::Error::Closed) => println!("eof"),
//!     Err(promptline::Error::Cancelled) => println!("^C"),
//!     Err(err) => eprintln!("error: {err}"),
//! }
//! ```
//!
//! # Completion
//!
//! ```no_run
//! use promptline::Editor;
//!
//! let mut editor = Editor::new();
//! editor.set_completion(|line, _cursor, out| {
//!     if line.starts_with("he") {
//!         out.add("hello", "hello", 5);
//!     }
//! });
//! ```
//!
//! # Async hosts
//!
//! With a non-blocking input descriptor, [`Editor::edit_start`] returns a
//! session whose [`EditSession::step`] never blocks: it yields
//! [`Step::Pending`] when the descriptor runs dry and the host re-enters
//! when it polls readable again.
//!
//! # Key bindings
//!
//! - **Left/Right, Ctrl-B/Ctrl-F**: move by character
//! - **Up/Down, Ctrl-P/Ctrl-N**: history
//! - **Home/End, Ctrl-A/Ctrl-E**: line ends
//! - **Backspace/Delete, Ctrl-H/Ctrl-D**: delete characters
//! - **Ctrl-K / Ctrl-U / Ctrl-W**: kill to end / whole line / word
//! - **Ctrl-T**: transpose; **Ctrl-L**: clear screen
//! - **Tab**: complete; **Ctrl-R**: reverse search
//! - **Enter**: accept; **Ctrl-C**: interrupt; **Ctrl-D** (empty): EOF

mod buffer;
mod decoder;
mod display;
mod search;
mod signals;
mod terminal;

pub mod completion;
pub mod editor;
pub mod encoding;
pub mod error;
pub mod event;
pub mod history;

pub use completion::{Completion, Completions};
pub use editor::{CompletionCallback, EditSession, Editor, Step};
pub use encoding::{CharLen, Encoding, SingleByte, Utf8};
pub use error::{Error, Result};
pub use event::{CharBytes, Key};
pub use history::History;
pub use signals::CancelHandle;
pub use terminal::{clear_screen_on, is_unsupported_term, restore_terminal};
