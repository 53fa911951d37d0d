#![forbid(unsafe_code)]

//! The editor: key dispatch, modes, and the public entry points.
//!
//! [`Editor`] holds everything that outlives a single prompt (history,
//! completion callback, configuration). [`EditSession`] is one active
//! prompt: it owns the decoder, the edit buffer, the screen bookkeeping
//! and the current mode, and is driven either by the blocking
//! [`Editor::read_line`] loop or step-by-step by an async host.
//!
//! Mode data lives inside the [`Mode`] variants, so completion state
//! exists exactly while completing and search state exactly while
//! searching.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Instant;

use crate::buffer::{Insert, LineBuffer};
use crate::completion::{
    self, Completions, LISTING_PROMPT_THRESHOLD,
};
use crate::decoder::{Decoder, Feed, ESC_TIMEOUT};
use crate::display::{self, ScreenState};
use crate::encoding::{Encoding, SingleByte};
use crate::error::{Error, Result};
use crate::event::{CharBytes, Key};
use crate::history::History;
use crate::search::{self, SearchState};
use crate::signals::{self, CancelHandle, Readiness, SignalMaskGuard};
use crate::terminal;

/// Completion callback: `(line, cursor_byte_offset, out)`.
///
/// The callback must not write to the terminal; a host that wants to
/// print from inside one calls [`EditSession::hide`] first and the
/// engine repaints afterwards.
pub type CompletionCallback = Box<dyn FnMut(&str, usize, &mut Completions) + Send>;

/// Result of one async step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The line was accepted.
    Line(String),
    /// No input is available right now; re-enter when the descriptor is
    /// readable.
    Pending,
}

/// Direction of history navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryDir {
    Prev,
    Next,
}

/// Top-level mode. Data is carried by the variant.
enum Mode {
    Normal,
    Completion(CompletionEpisode),
    Search(SearchState),
}

/// State of one COMPLETION episode.
struct CompletionEpisode {
    set: Completions,
    max_width: usize,
    phase: CompletionPhase,
    rotate: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionPhase {
    /// Waiting for the re-dispatched TAB that entered the mode.
    Trigger,
    /// Asked "Display all N possibilities?" and waiting for y/n.
    Confirm,
    /// Listing shown (or suppressed); TAB rotates candidates.
    Rotate,
}

/// A line editor with persistent history and configuration.
pub struct Editor {
    history: History,
    completion: Option<CompletionCallback>,
    multiline: bool,
    encoding: Box<dyn Encoding>,
    cancel: CancelHandle,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: History::new(),
            completion: None,
            multiline: false,
            encoding: Box::new(SingleByte),
            cancel: CancelHandle::new(),
        }
    }

    /// Select single-line (default) or wrapped multi-line display.
    pub fn set_multiline(&mut self, multiline: bool) {
        self.multiline = multiline;
    }

    /// Install the tab-completion callback.
    pub fn set_completion(
        &mut self,
        callback: impl FnMut(&str, usize, &mut Completions) + Send + 'static,
    ) {
        self.completion = Some(Box::new(callback));
    }

    /// Replace the character measurement hooks (UTF-8, for example).
    pub fn set_encoding(&mut self, encoding: impl Encoding + 'static) {
        self.encoding = Box::new(encoding);
    }

    /// A handle that cancels the edit in progress from any thread or a
    /// signal handler.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Append a line to history.
    pub fn history_add(&mut self, line: impl Into<String>) {
        self.history.add(line);
    }

    /// Change the history cap.
    pub fn history_set_max(&mut self, max_len: usize) {
        self.history.set_max(max_len);
    }

    /// Number of stored history entries.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Save history to a file, one line per entry.
    pub fn history_save(&self, path: impl AsRef<std::path::Path>) -> io::Result<()> {
        self.history.save(path)
    }

    /// Load history entries from a file.
    pub fn history_load(&mut self, path: impl AsRef<std::path::Path>) -> io::Result<()> {
        self.history.load(path)
    }

    /// Read one line from standard input, editing on standard output.
    pub fn read_line(&mut self, prompt: &str) -> Result<String> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let input = stdin.as_fd();
        let output = stdout.as_fd();
        self.read_line_from(input, output, prompt)
    }

    /// Read one line using explicit descriptors.
    ///
    /// On a non-terminal input the line is read without editing; on a
    /// blacklisted terminal the prompt is shown but editing is likewise
    /// disabled.
    pub fn read_line_from(
        &mut self,
        input: impl AsFd,
        output: impl AsFd,
        prompt: &str,
    ) -> Result<String> {
        let input = input.as_fd();
        let output = output.as_fd();

        if !rustix::termios::isatty(input) {
            return read_plain_line(input);
        }
        if terminal::is_unsupported_term() {
            terminal::write_all(output, prompt.as_bytes())?;
            return read_plain_line(input);
        }

        let mut session = self.edit_start(input, output, prompt)?;
        let outcome = loop {
            match session.step() {
                Ok(Step::Line(line)) => break Ok(line),
                Ok(Step::Pending) => {
                    session.wait_input()?;
                }
                Err(err) => break Err(err),
            }
        };
        session.finish()?;
        outcome
    }

    /// Begin an edit session for step-driven (async) hosts.
    ///
    /// If the input descriptor is a terminal it is switched to raw mode
    /// (and restored by [`EditSession::finish`] or drop); pipes are used
    /// as-is. A non-blocking input descriptor makes the session async:
    /// [`EditSession::step`] then returns [`Step::Pending`] instead of
    /// blocking.
    pub fn edit_start<'e>(
        &'e mut self,
        input: BorrowedFd<'e>,
        output: BorrowedFd<'e>,
        prompt: &str,
    ) -> Result<EditSession<'e>> {
        let is_tty = rustix::termios::isatty(input);
        if is_tty && terminal::is_unsupported_term() {
            return Err(Error::NoTty);
        }

        let is_async = rustix::fs::fcntl_getfl(input)
            .map(|flags| flags.contains(rustix::fs::OFlags::NONBLOCK))
            .unwrap_or(false);

        let raw = if is_tty {
            terminal::enable_raw(input)?;
            true
        } else {
            false
        };

        // Block the signals we coordinate with for the life of the
        // session; waits unblock them atomically. Async sessions read
        // opportunistically and keep the caller's mask.
        let mask = if is_async {
            None
        } else {
            Some(SignalMaskGuard::block().map_err(Error::Io)?)
        };

        let columns = terminal::get_columns(input, output);
        self.history.push_sentinel();

        let session = EditSession {
            editor: self,
            input,
            output,
            prompt: prompt.as_bytes().to_vec(),
            temp_prompt: None,
            buffer: LineBuffer::new(),
            decoder: Decoder::new(),
            screen: ScreenState::default(),
            columns,
            history_index: 0,
            mode: Mode::Normal,
            needs_refresh: false,
            is_async,
            esc_deadline: None,
            mask,
            raw,
            sentinel_active: true,
            finished: false,
        };
        terminal::write_all(session.output, &session.prompt)?;
        Ok(session)
    }
}

/// Read one line with no editing (non-terminal input or blacklisted
/// terminal). The first trailing LF and CR are stripped.
fn read_plain_line(input: BorrowedFd<'_>) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match terminal::read_some(input, &mut byte)? {
            0 => {
                if line.is_empty() {
                    return Err(Error::Closed);
                }
                break;
            }
            _ => {
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// One active prompt.
pub struct EditSession<'e> {
    editor: &'e mut Editor,
    input: BorrowedFd<'e>,
    output: BorrowedFd<'e>,
    prompt: Vec<u8>,
    temp_prompt: Option<Vec<u8>>,
    buffer: LineBuffer,
    decoder: Decoder,
    screen: ScreenState,
    columns: usize,
    history_index: usize,
    mode: Mode,
    needs_refresh: bool,
    is_async: bool,
    esc_deadline: Option<Instant>,
    mask: Option<SignalMaskGuard>,
    raw: bool,
    sentinel_active: bool,
    finished: bool,
}

impl<'e> EditSession<'e> {
    /// Process input until the line completes or, in async mode, until
    /// the descriptor runs dry.
    pub fn step(&mut self) -> Result<Step> {
        if self.finished {
            return Err(Error::InvalidArgument("session already finished"));
        }
        loop {
            let key = match self.next_key()? {
                Some(key) => key,
                None => return Ok(Step::Pending),
            };
            let done = self.dispatch(key);
            match done {
                Ok(Some(line)) => return Ok(Step::Line(line)),
                Ok(None) => {
                    if self.needs_refresh {
                        self.refresh()?;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Replace the base prompt.
    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.as_bytes().to_vec();
        self.needs_refresh = true;
    }

    /// Install or clear a temporary prompt override.
    pub fn set_temp_prompt(&mut self, prompt: Option<&str>) {
        self.temp_prompt = prompt.map(|p| p.as_bytes().to_vec());
        self.needs_refresh = true;
    }

    /// Repaint the prompt and line immediately.
    pub fn show_prompt(&mut self) -> Result<()> {
        self.refresh()
    }

    /// Clear the edit line so the host can print its own output; call
    /// [`EditSession::show_prompt`] afterwards to repaint.
    pub fn hide(&mut self) -> Result<()> {
        terminal::write_all(self.output, b"\r\x1b[0K")?;
        self.screen.reset();
        self.needs_refresh = true;
        Ok(())
    }

    /// Re-query the terminal width (after a resize, for example).
    pub fn update_size(&mut self) {
        let columns = terminal::get_columns(self.input, self.output);
        if columns != self.columns {
            self.columns = columns;
            self.needs_refresh = true;
        }
    }

    /// Home the cursor, erase the display, and repaint the edit line.
    pub fn clear_screen(&mut self) -> Result<()> {
        terminal::clear_screen(self.output)?;
        self.screen.reset();
        self.refresh()
    }

    /// End the session: release the sentinel, restore the terminal, and
    /// emit the final newline.
    pub fn finish(mut self) -> Result<()> {
        self.teardown();
        terminal::write_all(self.output, b"\n")?;
        Ok(())
    }

    fn teardown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.sentinel_active {
            self.editor.history.pop_sentinel();
            self.sentinel_active = false;
        }
        self.mask = None;
        if self.raw {
            terminal::disable_raw(self.input);
            self.raw = false;
        }
    }

    /// Block until the input descriptor is readable (used by the sync
    /// loop when driving a non-blocking descriptor).
    pub(crate) fn wait_input(&mut self) -> Result<()> {
        let deadline = self.escape_timeout_remaining();
        match signals::wait_readable(self.input, deadline, None).map_err(Error::Io)? {
            Readiness::Ready | Readiness::TimedOut | Readiness::Interrupted => Ok(()),
        }
    }

    // ── Key acquisition ─────────────────────────────────────────────

    fn escape_timeout_remaining(&mut self) -> Option<std::time::Duration> {
        if self.decoder.awaiting_escape() {
            let deadline = *self.esc_deadline.get_or_insert_with(|| Instant::now() + ESC_TIMEOUT);
            Some(deadline.saturating_duration_since(Instant::now()))
        } else {
            self.esc_deadline = None;
            None
        }
    }

    /// Produce the next key event, or `None` in async mode when the
    /// descriptor has no data.
    fn next_key(&mut self) -> Result<Option<Key>> {
        loop {
            if let Some(key) = self.decoder.pop_pushback() {
                return Ok(Some(key));
            }
            if self.editor.cancel.take() {
                return Ok(Some(Key::Cancelled));
            }
            if signals::take_winch() {
                self.update_size();
                if self.needs_refresh {
                    self.refresh()?;
                }
            }

            let timeout = self.escape_timeout_remaining();

            if !self.is_async {
                let mask = self.mask.as_ref().map(SignalMaskGuard::wait_mask);
                match signals::wait_readable(self.input, timeout, mask).map_err(Error::Io)? {
                    Readiness::TimedOut => {
                        self.esc_deadline = None;
                        return Ok(Some(self.decoder.escape_timeout()));
                    }
                    Readiness::Interrupted => continue,
                    Readiness::Ready => {}
                }
            } else if let Some(remaining) = timeout {
                // A dangling ESC resolves once its deadline passes even
                // if no further bytes ever arrive.
                if remaining.is_zero() {
                    self.esc_deadline = None;
                    return Ok(Some(self.decoder.escape_timeout()));
                }
            }

            let mut byte = [0u8; 1];
            match terminal::read_some(self.input, &mut byte) {
                Ok(0) => return Ok(Some(Key::Closed)),
                Ok(_) => match self.decoder.feed(byte[0], self.editor.encoding.as_ref()) {
                    Feed::Key(key) => {
                        self.esc_deadline = None;
                        return Ok(Some(key));
                    }
                    Feed::Pending | Feed::None => continue,
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if self.is_async {
                        return Ok(None);
                    }
                    // Spurious wakeup on a blocking descriptor; wait again.
                    continue;
                }
                Err(err) => return Err(Error::Io(err)),
            }
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────

    fn dispatch(&mut self, key: Key) -> Result<Option<String>> {
        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.dispatch_normal(key),
            Mode::Completion(episode) => self.dispatch_completion(episode, key),
            Mode::Search(state) => self.dispatch_search(state, key),
        }
    }

    fn dispatch_normal(&mut self, key: Key) -> Result<Option<String>> {
        match key {
            Key::Enter => return self.accept_line().map(Some),
            Key::Ctrl('c') | Key::Cancelled => return self.interrupt().map(|_| None),
            Key::Ctrl('d') => {
                if self.buffer.is_empty() {
                    return Err(self.terminate(Error::Closed));
                }
                self.edit(|b, enc| b.delete_forward(enc));
            }
            Key::Closed => {
                if self.buffer.is_empty() {
                    return Err(self.terminate(Error::Closed));
                }
                return self.accept_line().map(Some);
            }
            Key::Error => {
                return Err(self.terminate(Error::Io(io::Error::other("input decoder error"))));
            }
            Key::Backspace | Key::Ctrl('h') => self.edit(|b, enc| b.backspace(enc)),
            Key::Ctrl('t') => self.edit(|b, _| b.transpose()),
            Key::Ctrl('b') | Key::Left => self.edit(|b, enc| b.move_left(enc)),
            Key::Ctrl('f') | Key::Right => self.edit(|b, enc| b.move_right(enc)),
            Key::Ctrl('p') | Key::Up => self.history_move(HistoryDir::Prev),
            Key::Ctrl('n') | Key::Down => self.history_move(HistoryDir::Next),
            Key::Ctrl('a') | Key::Home => self.edit(|b, _| b.move_home()),
            Key::Ctrl('e') | Key::End => self.edit(|b, _| b.move_end()),
            Key::Ctrl('u') => self.edit(|b, _| b.kill_line()),
            Key::Ctrl('k') => self.edit(|b, _| b.kill_to_end()),
            Key::Ctrl('w') => self.edit(|b, _| b.delete_prev_word()),
            Key::Ctrl('l') => self.clear_screen()?,
            Key::Delete => self.edit(|b, enc| b.delete_forward(enc)),
            Key::Tab => {
                if self.editor.completion.is_some() {
                    self.decoder.push_back(Key::Tab);
                    self.mode = Mode::Completion(CompletionEpisode {
                        set: Completions::new(),
                        max_width: 0,
                        phase: CompletionPhase::Trigger,
                        rotate: 0,
                    });
                } else {
                    self.insert_char(CharBytes::single(b'\t'))?;
                }
            }
            Key::Ctrl('r') => {
                self.decoder.push_back(Key::Ctrl('r'));
                self.temp_prompt = Some(search::search_prompt(b"").into_bytes());
                self.needs_refresh = true;
                self.mode = Mode::Search(SearchState::begin(
                    self.buffer.as_bytes(),
                    self.buffer.cursor(),
                    self.history_index,
                ));
            }
            Key::Char(ch) => self.insert_char(ch)?,
            // Esc on its own, and control letters the tables do not
            // bind, do nothing.
            Key::Esc | Key::Ctrl(_) => {}
        }
        Ok(None)
    }

    fn dispatch_completion(
        &mut self,
        mut episode: CompletionEpisode,
        key: Key,
    ) -> Result<Option<String>> {
        match episode.phase {
            CompletionPhase::Trigger => {
                debug_assert_eq!(key, Key::Tab);
                self.run_completion_callback(&mut episode.set);
                episode.set.sort();
                match episode.set.len() {
                    0 => {
                        terminal::bell(self.output);
                        // mode stays Normal
                    }
                    1 => {
                        self.apply_single_candidate(&episode.set)?;
                    }
                    count => {
                        self.insert_common_prefix(&episode.set)?;
                        episode.max_width =
                            episode.set.max_suggestion_width(self.editor.encoding.as_ref());
                        if count >= LISTING_PROMPT_THRESHOLD {
                            terminal::write_all(
                                self.output,
                                completion::listing_prompt(count).as_bytes(),
                            )?;
                            // Hold the repaint until the question is
                            // answered; a refresh would overwrite it.
                            self.needs_refresh = false;
                            episode.phase = CompletionPhase::Confirm;
                        } else {
                            self.print_listing(&episode)?;
                            episode.phase = CompletionPhase::Rotate;
                        }
                        self.mode = Mode::Completion(episode);
                    }
                }
            }
            CompletionPhase::Confirm => match key {
                Key::Char(c) if c.as_bytes() == b"y" => {
                    self.print_listing(&episode)?;
                    episode.phase = CompletionPhase::Rotate;
                    self.mode = Mode::Completion(episode);
                }
                Key::Char(c) if c.as_bytes() == b"n" => {
                    terminal::write_all(self.output, b"\r\n")?;
                    self.screen.reset();
                    self.needs_refresh = true;
                    episode.phase = CompletionPhase::Rotate;
                    self.mode = Mode::Completion(episode);
                }
                Key::Ctrl('c') | Key::Cancelled | Key::Closed => {
                    // Abandon the listing; NORMAL decides what the key means.
                    self.decoder.push_back(key);
                    self.screen.reset();
                    self.needs_refresh = true;
                }
                _ => {
                    terminal::bell(self.output);
                    self.mode = Mode::Completion(episode);
                }
            },
            CompletionPhase::Rotate => match key {
                Key::Tab => {
                    let entry = &episode.set.entries()[episode.rotate];
                    self.buffer
                        .set_text(entry.replacement.as_bytes(), entry.cursor);
                    self.needs_refresh = true;
                    episode.rotate = (episode.rotate + 1) % episode.set.len();
                    self.mode = Mode::Completion(episode);
                }
                other => {
                    // The completion set is dropped here with the episode.
                    self.decoder.push_back(other);
                }
            },
        }
        Ok(None)
    }

    fn dispatch_search(&mut self, mut state: SearchState, key: Key) -> Result<Option<String>> {
        match key {
            Key::Char(ch) => {
                state.query.extend_from_slice(ch.as_bytes());
                self.run_search(&mut state);
                self.mode = Mode::Search(state);
            }
            Key::Backspace | Key::Ctrl('h') => {
                if !state.query.is_empty() {
                    let ch = self
                        .editor
                        .encoding
                        .prev_char_len(&state.query, state.query.len());
                    let new_len = state.query.len().saturating_sub(ch.bytes.max(1));
                    state.query.truncate(new_len);
                }
                if state.query.is_empty() {
                    self.temp_prompt = Some(search::search_prompt(b"").into_bytes());
                    self.needs_refresh = true;
                } else {
                    // Rewind: a shorter query searches from where the
                    // episode began, so more recent matches reappear.
                    state.current_index = state.saved_history_index;
                    self.run_search(&mut state);
                }
                self.mode = Mode::Search(state);
            }
            Key::Ctrl('r') => {
                if state.query.is_empty() {
                    if self.editor.history.len() > 1 {
                        state.current_index = self.history_index;
                    } else {
                        terminal::bell(self.output);
                    }
                    self.needs_refresh = true;
                } else if state.found {
                    state.current_index += 1;
                    self.run_search(&mut state);
                } else {
                    terminal::bell(self.output);
                }
                self.mode = Mode::Search(state);
            }
            Key::Ctrl('c') | Key::Cancelled => {
                terminal::write_all(self.output, b"^C\r\n")?;
                self.buffer
                    .set_text(&state.saved_buffer, state.saved_cursor);
                self.history_index = state.saved_history_index;
                self.temp_prompt = None;
                self.screen.reset();
                self.needs_refresh = true;
            }
            Key::Closed => {
                self.temp_prompt = None;
                self.needs_refresh = true;
                self.decoder.push_back(Key::Closed);
            }
            other => {
                // Keep the matched entry; NORMAL processes the key.
                self.temp_prompt = None;
                self.needs_refresh = true;
                self.decoder.push_back(other);
            }
        }
        Ok(None)
    }

    fn run_search(&mut self, state: &mut SearchState) {
        match search::search_backward(&self.editor.history, state.current_index, &state.query) {
            Some((index, cursor)) => {
                state.current_index = index;
                state.found = true;
                self.temp_prompt = Some(search::search_prompt(&state.query).into_bytes());
                let entry = self
                    .editor
                    .history
                    .from_newest(index)
                    .unwrap_or_default()
                    .as_bytes()
                    .to_vec();
                self.history_index = index;
                self.buffer.set_text(&entry, cursor);
                self.needs_refresh = true;
            }
            None => {
                state.found = false;
                terminal::bell(self.output);
            }
        }
    }

    // ── Editing helpers ─────────────────────────────────────────────

    fn edit(&mut self, op: impl FnOnce(&mut LineBuffer, &dyn Encoding) -> bool) {
        if op(&mut self.buffer, self.editor.encoding.as_ref()) {
            self.needs_refresh = true;
        }
    }

    fn insert_char(&mut self, ch: CharBytes) -> Result<()> {
        let kind = self.buffer.insert(ch.as_bytes());
        if kind == Insert::Appended && !self.editor.multiline {
            let prompt_cols =
                display::prompt_width(self.current_prompt(), self.editor.encoding.as_ref());
            let line_cols = display::column_pos(
                self.buffer.as_bytes(),
                self.editor.encoding.as_ref(),
                self.buffer.len(),
            );
            if prompt_cols + line_cols < self.columns {
                // Trivial append: echo only the new bytes.
                terminal::write_all(self.output, ch.as_bytes())?;
                return Ok(());
            }
        }
        self.needs_refresh = true;
        Ok(())
    }

    fn accept_line(&mut self) -> Result<String> {
        if self.sentinel_active {
            self.editor.history.pop_sentinel();
            self.sentinel_active = false;
        }
        if self.editor.multiline && self.buffer.move_end() {
            self.refresh()?;
        }
        Ok(self.buffer.to_text())
    }

    /// Ctrl-C in NORMAL: terminate on an empty line, otherwise start the
    /// line over on a fresh row.
    fn interrupt(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            terminal::write_all(self.output, b"^C")?;
            return Err(self.terminate(Error::Cancelled));
        }
        terminal::write_all(self.output, b"^C\r\n")?;
        self.buffer.kill_line();
        self.history_index = 0;
        self.editor.history.set_from_newest(0, String::new());
        self.screen.reset();
        self.needs_refresh = true;
        Ok(())
    }

    /// Release the sentinel and hand back the terminal condition.
    fn terminate(&mut self, err: Error) -> Error {
        if self.sentinel_active {
            self.editor.history.pop_sentinel();
            self.sentinel_active = false;
        }
        err
    }

    fn history_move(&mut self, dir: HistoryDir) {
        let len = self.editor.history.len();
        if len <= 1 {
            return;
        }
        // Preserve in-progress edits on the entry being browsed.
        self.editor
            .history
            .set_from_newest(self.history_index, self.buffer.to_text());
        let new_index = match dir {
            HistoryDir::Prev => (self.history_index + 1).min(len - 1),
            HistoryDir::Next => self.history_index.saturating_sub(1),
        };
        if new_index == self.history_index {
            return;
        }
        self.history_show(new_index);
    }

    fn history_show(&mut self, index: usize) {
        let entry = self
            .editor
            .history
            .from_newest(index)
            .unwrap_or_default()
            .as_bytes()
            .to_vec();
        let cursor = entry.len();
        self.buffer.set_text(&entry, cursor);
        self.history_index = index;
        self.needs_refresh = true;
    }

    // ── Completion helpers ──────────────────────────────────────────

    fn run_completion_callback(&mut self, set: &mut Completions) {
        let Some(mut callback) = self.editor.completion.take() else {
            return;
        };
        let line = self.buffer.to_text();
        callback(&line, self.buffer.cursor(), set);
        self.editor.completion = Some(callback);
    }

    fn apply_single_candidate(&mut self, set: &Completions) -> Result<()> {
        let entry = &set.entries()[0];
        self.buffer
            .set_text(entry.replacement.as_bytes(), entry.cursor);
        if !entry.replacement.ends_with('/') {
            self.buffer.move_end();
            self.buffer.insert(b" ");
        }
        self.needs_refresh = true;
        Ok(())
    }

    fn insert_common_prefix(&mut self, set: &Completions) -> Result<()> {
        let Some(prefix) = completion::common_prefix(set.entries()) else {
            return Ok(());
        };
        let before = &self.buffer.as_bytes()[..self.buffer.cursor()];
        let extension = completion::prefix_extension(&prefix, before).to_vec();
        if !extension.is_empty() {
            self.buffer.insert(&extension);
            self.needs_refresh = true;
        }
        Ok(())
    }

    fn print_listing(&mut self, episode: &CompletionEpisode) -> Result<()> {
        let mut out = Vec::new();
        completion::render_listing(
            &mut out,
            &episode.set,
            episode.max_width,
            self.columns,
            self.editor.encoding.as_ref(),
        );
        terminal::write_all(self.output, &out)?;
        // The listing scrolled the prompt away; repaint from scratch.
        self.screen.reset();
        self.needs_refresh = true;
        Ok(())
    }

    // ── Refresh ─────────────────────────────────────────────────────

    fn current_prompt(&self) -> &[u8] {
        self.temp_prompt.as_deref().unwrap_or(&self.prompt)
    }

    fn refresh(&mut self) -> Result<()> {
        let prompt = self.temp_prompt.clone().unwrap_or_else(|| self.prompt.clone());
        let mut out = Vec::new();
        if self.editor.multiline {
            display::render_multi_line(
                &mut out,
                &prompt,
                &self.buffer,
                self.columns,
                self.editor.encoding.as_ref(),
                &mut self.screen,
            );
        } else {
            display::render_single_line(
                &mut out,
                &prompt,
                &self.buffer,
                self.columns,
                self.editor.encoding.as_ref(),
            );
        }
        terminal::write_all(self.output, &out)?;
        self.needs_refresh = false;
        Ok(())
    }
}

impl Drop for EditSession<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
