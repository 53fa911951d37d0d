#![forbid(unsafe_code)]

//! Low-level terminal adapter: raw mode, geometry, bell, clear.
//!
//! Raw-mode state is process-wide. The original terminal attributes are
//! captured once into a global the first time raw mode is entered, and a
//! panic hook installed at the same time restores them on any unwinding
//! exit. Hosts that terminate via `process::exit` can call
//! [`restore_terminal`] first. Two concurrent sessions in one process are
//! unsupported by contract.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::{Mutex, OnceLock};

use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};

use crate::error::{Error, Result};

/// Terminals that cannot interpret the escape vocabulary we emit.
const UNSUPPORTED_TERMS: &[&str] = &["dumb", "cons25", "emacs"];

/// Width assumed when every geometry query fails.
const FALLBACK_COLUMNS: usize = 80;

const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";
const CURSOR_REPORT_QUERY: &[u8] = b"\x1b[6n";
const CURSOR_FAR_RIGHT: &[u8] = b"\x1b[999C";
const BELL: &[u8] = b"\x07";

/// Saved pre-raw terminal attributes plus the raw-mode flag, shared by
/// every session and by the panic hook.
#[derive(Default)]
struct RestoreState {
    saved: Option<Termios>,
    raw: bool,
}

fn restore_state() -> &'static Mutex<RestoreState> {
    static STATE: OnceLock<Mutex<RestoreState>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(RestoreState::default()))
}

/// True if `TERM` names a terminal on the blacklist. A missing `TERM` is
/// treated as supported, matching historic behavior.
#[must_use]
pub fn is_unsupported_term() -> bool {
    match std::env::var("TERM") {
        Ok(term) => UNSUPPORTED_TERMS
            .iter()
            .any(|t| term.eq_ignore_ascii_case(t)),
        Err(_) => false,
    }
}

/// Put the descriptor into raw mode: no canonicalization, no echo, no
/// signal generation, no CR/NL translation, 8-bit characters, reads
/// return after every byte.
pub(crate) fn enable_raw(fd: BorrowedFd<'_>) -> Result<()> {
    if !rustix::termios::isatty(fd) {
        return Err(Error::NoTty);
    }
    install_panic_hook();

    let original = termios::tcgetattr(fd).map_err(|_| Error::NoTty)?;

    {
        let mut state = restore_state().lock().expect("terminal state poisoned");
        if state.saved.is_none() {
            state.saved = Some(original.clone());
        }
    }

    let mut raw = original;
    raw.input_flags.remove(
        InputFlags::BRKINT | InputFlags::ICRNL | InputFlags::INPCK | InputFlags::ISTRIP,
    );
    raw.output_flags.remove(OutputFlags::OPOST);
    raw.control_flags.insert(ControlFlags::CS8);
    raw.local_flags.remove(
        LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::IEXTEN | LocalFlags::ISIG,
    );
    // Deliver every byte immediately, no inter-byte timer.
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

    termios::tcsetattr(fd, SetArg::TCSAFLUSH, &raw).map_err(|_| Error::NoTty)?;
    restore_state().lock().expect("terminal state poisoned").raw = true;
    #[cfg(feature = "tracing")]
    tracing::debug!("raw mode enabled");
    Ok(())
}

/// Restore the attributes saved by [`enable_raw`]. Errors are ignored;
/// there is nothing useful to do with them on the way out.
pub(crate) fn disable_raw(fd: BorrowedFd<'_>) {
    let mut state = restore_state().lock().expect("terminal state poisoned");
    if !state.raw {
        return;
    }
    if let Some(saved) = state.saved.as_ref() {
        if termios::tcsetattr(fd, SetArg::TCSAFLUSH, saved).is_ok() {
            state.raw = false;
            #[cfg(feature = "tracing")]
            tracing::debug!("raw mode disabled");
        }
    }
}

/// Best-effort terminal restore for exit paths that skip destructors.
///
/// Re-opens the controlling terminal rather than trusting any stored
/// descriptor to still be valid. Safe to call at any time, from the panic
/// hook included; does nothing when raw mode is not active.
pub fn restore_terminal() {
    let mut state = match restore_state().lock() {
        Ok(state) => state,
        Err(poisoned) => poisoned.into_inner(),
    };
    if !state.raw {
        return;
    }
    if let (Some(saved), Ok(tty)) = (state.saved.as_ref(), std::fs::File::open("/dev/tty")) {
        if termios::tcsetattr(tty.as_fd(), SetArg::TCSAFLUSH, saved).is_ok() {
            state.raw = false;
        }
    }
}

fn install_panic_hook() {
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore_terminal();
            previous(info);
        }));
    });
}

/// Write the whole buffer, retrying interrupted and short writes.
pub(crate) fn write_all(fd: BorrowedFd<'_>, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match rustix::io::write(fd, bytes) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => bytes = &bytes[n..],
            Err(rustix::io::Errno::INTR) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Read once into `buf`, retrying EINTR. Returns `Ok(0)` at end of input.
pub(crate) fn read_some(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match rustix::io::read(fd, buf) {
            Ok(n) => return Ok(n),
            Err(rustix::io::Errno::INTR) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Home the cursor and erase the display.
pub(crate) fn clear_screen(fd: BorrowedFd<'_>) -> io::Result<()> {
    write_all(fd, CLEAR_SCREEN)
}

/// Clear the screen of an arbitrary descriptor (host-facing helper).
pub fn clear_screen_on(fd: impl AsFd) -> io::Result<()> {
    clear_screen(fd.as_fd())
}

/// Ring the terminal bell.
pub(crate) fn bell(fd: BorrowedFd<'_>) {
    let _ = write_all(fd, BELL);
}

/// Terminal width in columns.
///
/// Order of preference: kernel window size, cursor-position probing
/// (emit a report query, jump to the right margin, re-query, jump back),
/// then a hardcoded 80. The probe is only attempted on a real terminal;
/// on pipes the query bytes would never be answered.
pub(crate) fn get_columns(input: BorrowedFd<'_>, output: BorrowedFd<'_>) -> usize {
    if let Ok(size) = rustix::termios::tcgetwinsize(output) {
        if size.ws_col > 0 {
            return size.ws_col as usize;
        }
    }
    if !rustix::termios::isatty(input) {
        return FALLBACK_COLUMNS;
    }
    probe_columns(input, output)
        .filter(|&cols| cols > 0)
        .unwrap_or(FALLBACK_COLUMNS)
}

fn probe_columns(input: BorrowedFd<'_>, output: BorrowedFd<'_>) -> Option<usize> {
    let start = query_cursor_column(input, output)?;
    write_all(output, CURSOR_FAR_RIGHT).ok()?;
    let cols = query_cursor_column(input, output)?;
    if cols > start {
        // Return the cursor where we found it. Best effort: if this write
        // fails the next refresh repositions anyway.
        let _ = write_all(output, format!("\x1b[{}D", cols - start).as_bytes());
    }
    Some(cols)
}

/// Ask the terminal for the cursor position and parse the column out of
/// the `ESC [ row ; col R` report.
fn query_cursor_column(input: BorrowedFd<'_>, output: BorrowedFd<'_>) -> Option<usize> {
    write_all(output, CURSOR_REPORT_QUERY).ok()?;

    let mut reply = [0u8; 32];
    let mut len = 0;
    while len < reply.len() - 1 {
        let mut byte = [0u8; 1];
        match read_some(input, &mut byte) {
            Ok(1) => {}
            _ => break,
        }
        if byte[0] == b'R' {
            break;
        }
        reply[len] = byte[0];
        len += 1;
    }

    let reply = &reply[..len];
    let body = reply.strip_prefix(b"\x1b[")?;
    let text = std::str::from_utf8(body).ok()?;
    let (_rows, cols) = text.split_once(';')?;
    cols.parse().ok()
}
