#![forbid(unsafe_code)]

//! Screen refresh engines.
//!
//! Both engines render the entire reconciliation into one byte buffer
//! that the session writes with a single call, so a refresh can never
//! tear. The single-line engine horizontally scrolls a view over the
//! buffer; the multi-line engine repaints every row the line previously
//! occupied and repositions the cursor with row/column arithmetic.
//!
//! Invariant on entry to either engine: the terminal cursor sits at the
//! visual position recorded by the previous refresh.

use crate::buffer::LineBuffer;
use crate::encoding::Encoding;

/// Erase from cursor to end of line.
const ERASE_TO_EOL: &[u8] = b"\x1b[0K";

/// Visual bookkeeping carried between refreshes of one session.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ScreenState {
    /// Column position of the cursor at the previous refresh
    /// (multi-line column arithmetic, prompt included).
    pub(crate) old_col_pos: usize,
    /// Largest number of rows any refresh of this line has used.
    pub(crate) max_rows: usize,
}

impl ScreenState {
    /// Forget the previous layout: next refresh starts from a fresh row.
    pub(crate) fn reset(&mut self) {
        *self = ScreenState::default();
    }
}

/// Recognize one ANSI escape sequence at the start of `buf` and return
/// its byte length. Only the `ESC [ ... final` shape with the finals a
/// prompt plausibly contains (cursor motion and SGR) is accepted.
pub(crate) fn ansi_escape_len(buf: &[u8]) -> Option<usize> {
    if buf.len() <= 2 || &buf[..2] != b"\x1b[" {
        return None;
    }
    for (i, &byte) in buf.iter().enumerate().skip(2) {
        match byte {
            b'A' | b'B' | b'C' | b'D' | b'E' | b'F' | b'G' | b'H' | b'J' | b'K' | b'S'
            | b'T' | b'f' | b'm' => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Column width of a prompt: escape sequences are written to the
/// terminal but occupy no columns, so they are skipped before measuring.
pub(crate) fn prompt_width(prompt: &[u8], encoding: &dyn Encoding) -> usize {
    let mut visible = Vec::with_capacity(prompt.len());
    let mut off = 0;
    while off < prompt.len() {
        if let Some(len) = ansi_escape_len(&prompt[off..]) {
            off += len;
            continue;
        }
        visible.push(prompt[off]);
        off += 1;
    }
    column_pos(&visible, encoding, visible.len())
}

/// Column offset of byte position `pos` from the start of `buf`.
pub(crate) fn column_pos(buf: &[u8], encoding: &dyn Encoding, pos: usize) -> usize {
    let mut cols = 0;
    let mut off = 0;
    while off < pos {
        let ch = encoding.next_char_len(buf, off);
        off += ch.bytes.max(1);
        cols += ch.cols;
    }
    cols
}

/// Column offset of `pos` under wrapping: a character that does not fit
/// in the remainder of a row is pushed to the next one, and the skipped
/// cells count toward the offset. `initial` is the width already consumed
/// on the first row (the prompt).
pub(crate) fn column_pos_multiline(
    buf: &[u8],
    encoding: &dyn Encoding,
    pos: usize,
    cols: usize,
    initial: usize,
) -> usize {
    let mut ret = 0usize;
    let mut col_width = initial;
    let mut off = 0;

    while off < buf.len() {
        let ch = encoding.next_char_len(buf, off);
        let dif = (col_width + ch.cols) as isize - cols as isize;
        if dif > 0 {
            ret += dif as usize;
            col_width = ch.cols;
        } else if dif == 0 {
            col_width = 0;
        } else {
            col_width += ch.cols;
        }

        if off >= pos {
            break;
        }
        off += ch.bytes.max(1);
        ret += ch.cols;
    }

    ret
}

/// Single-line refresh: scroll the view so the cursor is visible, then
/// repaint prompt + view and erase the remainder of the row.
pub(crate) fn render_single_line(
    out: &mut Vec<u8>,
    prompt: &[u8],
    buffer: &LineBuffer,
    cols: usize,
    encoding: &dyn Encoding,
) {
    let cols = cols.max(1);
    let pcols = prompt_width(prompt, encoding);
    let bytes = buffer.as_bytes();
    let mut start = 0;
    let mut end = bytes.len();
    let mut pos = buffer.cursor();

    // Scroll until the cursor column fits on the row.
    while start < end && pcols + column_pos(&bytes[start..end], encoding, pos) >= cols {
        let ch = encoding.next_char_len(bytes, start);
        start += ch.bytes.max(1);
        pos = pos.saturating_sub(ch.bytes.max(1));
    }
    // Clamp the visible tail to the row width.
    while start < end && pcols + column_pos(&bytes[start..end], encoding, end - start) > cols {
        let ch = encoding.prev_char_len(bytes, end);
        end -= ch.bytes.max(1).min(end - start);
    }

    out.extend_from_slice(b"\r");
    out.extend_from_slice(prompt);
    out.extend_from_slice(&bytes[start..end]);
    out.extend_from_slice(ERASE_TO_EOL);
    let cursor_col = pcols + column_pos(&bytes[start..end], encoding, pos);
    out.extend_from_slice(b"\r");
    if cursor_col > 0 {
        out.extend_from_slice(format!("\x1b[{cursor_col}C").as_bytes());
    }
}

/// Multi-line refresh: erase every previously used row, repaint the
/// whole line, and walk the cursor to its new row and column.
pub(crate) fn render_multi_line(
    out: &mut Vec<u8>,
    prompt: &[u8],
    buffer: &LineBuffer,
    cols: usize,
    encoding: &dyn Encoding,
    screen: &mut ScreenState,
) {
    let cols = cols.max(1);
    let pcols = prompt_width(prompt, encoding);
    let bytes = buffer.as_bytes();
    let total_cols = column_pos_multiline(bytes, encoding, bytes.len(), cols, pcols);
    let mut rows = (pcols + total_cols + cols - 1) / cols;
    // Relative row of the cursor at the previous refresh, 1-based.
    let cursor_row = (pcols + screen.old_col_pos + cols) / cols;
    let old_rows = screen.max_rows;

    if rows > screen.max_rows {
        screen.max_rows = rows;
    }

    // Go down to the last row the line used, then erase upward.
    if old_rows > cursor_row {
        #[cfg(feature = "tracing")]
        tracing::trace!(down = old_rows - cursor_row, "refresh: descend");
        out.extend_from_slice(format!("\x1b[{}B", old_rows - cursor_row).as_bytes());
    }
    for _ in 0..old_rows.saturating_sub(1) {
        out.extend_from_slice(b"\r");
        out.extend_from_slice(ERASE_TO_EOL);
        out.extend_from_slice(b"\x1b[1A");
    }
    out.extend_from_slice(b"\r");
    out.extend_from_slice(ERASE_TO_EOL);

    out.extend_from_slice(prompt);
    out.extend_from_slice(bytes);

    let cursor_cols = column_pos_multiline(bytes, encoding, buffer.cursor(), cols, pcols);

    // Cursor at end-of-line landing exactly on a row boundary: open a
    // fresh row so the next keystroke does not overwrite the tail.
    if buffer.cursor() > 0
        && buffer.cursor() == bytes.len()
        && (cursor_cols + pcols) % cols == 0
    {
        #[cfg(feature = "tracing")]
        tracing::trace!("refresh: wrap to fresh row");
        out.extend_from_slice(b"\n\r");
        rows += 1;
        if rows > screen.max_rows {
            screen.max_rows = rows;
        }
    }

    let new_cursor_row = (pcols + cursor_cols + cols) / cols;
    #[cfg(feature = "tracing")]
    tracing::trace!(rows, new_cursor_row, "refresh: reposition");
    if rows > new_cursor_row {
        out.extend_from_slice(format!("\x1b[{}A", rows - new_cursor_row).as_bytes());
    }
    let col = (pcols + cursor_cols) % cols;
    out.extend_from_slice(b"\r");
    if col > 0 {
        out.extend_from_slice(format!("\x1b[{col}C").as_bytes());
    }

    screen.old_col_pos = cursor_cols;
}
