//! End-to-end editor tests over socket pairs.
//!
//! Keystrokes are written to one end of a socket pair and the engine
//! reads them from the other; everything the engine writes to its output
//! descriptor is captured and inspected. Sockets are not terminals, so
//! the sessions run without raw mode and fall back to the 80-column
//! default width.

use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use promptline::{Editor, Error, Step};

/// Feed `keys`, run the session to completion, and return the result
/// together with everything written to the output descriptor.
fn drive(editor: &mut Editor, prompt: &str, keys: &[u8]) -> (Result<String, Error>, Vec<u8>) {
    let (session_in, mut feeder) = UnixStream::pair().unwrap();
    let (session_out, mut capture) = UnixStream::pair().unwrap();

    feeder.write_all(keys).unwrap();
    // Close the feeder so a consumed terminator still ends the session
    // through the end-of-input path instead of hanging the test.
    drop(feeder);

    let result = {
        let mut session = editor
            .edit_start(session_in.as_fd(), session_out.as_fd(), prompt)
            .unwrap();
        let result = loop {
            match session.step() {
                Ok(Step::Line(line)) => break Ok(line),
                Ok(Step::Pending) => std::thread::sleep(Duration::from_millis(2)),
                Err(err) => break Err(err),
            }
        };
        session.finish().unwrap();
        result
    };

    drop(session_out);
    let mut output = Vec::new();
    capture.read_to_end(&mut output).unwrap();
    (result, output)
}

fn output_text(output: &[u8]) -> String {
    String::from_utf8_lossy(output).into_owned()
}

// ── Plain editing ────────────────────────────────────────────────────

#[test]
fn plain_input_is_returned() {
    let mut editor = Editor::new();
    let (result, output) = drive(&mut editor, "> ", b"hello\r");
    assert_eq!(result.unwrap(), "hello");
    let text = output_text(&output);
    assert!(text.starts_with("> "), "prompt first: {text:?}");
    assert!(text.contains("hello"));
}

#[test]
fn cursor_movement_edits_in_place() {
    let mut editor = Editor::new();
    // abc, two lefts, insert x: axbc
    let (result, _) = drive(&mut editor, "> ", b"abc\x1b[D\x1b[Dx\r");
    assert_eq!(result.unwrap(), "axbc");
}

#[test]
fn home_end_keys_jump_to_line_ends() {
    let mut editor = Editor::new();
    // "bc", Home, 'a', End, 'd' -> abcd
    let (result, _) = drive(&mut editor, "> ", b"bc\x1b[Ha\x1b[Fd\r");
    assert_eq!(result.unwrap(), "abcd");
}

#[test]
fn ctrl_a_and_ctrl_e_jump_to_line_ends() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"bc\x01a\x05d\r");
    assert_eq!(result.unwrap(), "abcd");
}

#[test]
fn backspace_removes_previous_char() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"heya\x7f\x7fllo\r");
    assert_eq!(result.unwrap(), "hello");
}

#[test]
fn delete_key_removes_forward() {
    let mut editor = Editor::new();
    // "abc", Left, Left, Delete -> ac
    let (result, _) = drive(&mut editor, "> ", b"abc\x1b[D\x1b[D\x1b[3~\r");
    assert_eq!(result.unwrap(), "ac");
}

#[test]
fn transpose_swaps_characters() {
    let mut editor = Editor::new();
    // "ba", Left, Ctrl-T -> ab
    let (result, _) = drive(&mut editor, "> ", b"ba\x1b[D\x14\r");
    assert_eq!(result.unwrap(), "ab");
}

#[test]
fn kill_line_and_retype() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"wrong\x15right\r");
    assert_eq!(result.unwrap(), "right");
}

#[test]
fn kill_to_end_truncates_at_cursor() {
    let mut editor = Editor::new();
    // "abcdef", Left x3, Ctrl-K -> abc
    let (result, _) = drive(&mut editor, "> ", b"abcdef\x1b[D\x1b[D\x1b[D\x0b\r");
    assert_eq!(result.unwrap(), "abc");
}

#[test]
fn delete_previous_word() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"keep drop  \x17\r");
    assert_eq!(result.unwrap(), "keep ");
}

#[test]
fn tab_without_callback_inserts_tab() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"a\tb\r");
    assert_eq!(result.unwrap(), "a\tb");
}

// ── Termination semantics ────────────────────────────────────────────

#[test]
fn eof_on_empty_buffer_is_closed() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"");
    assert!(matches!(result, Err(Error::Closed)));
}

#[test]
fn eof_with_pending_text_accepts_the_line() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"partial");
    assert_eq!(result.unwrap(), "partial");
}

#[test]
fn ctrl_d_on_empty_buffer_is_closed() {
    let mut editor = Editor::new();
    let (result, _) = drive(&mut editor, "> ", b"\x04");
    assert!(matches!(result, Err(Error::Closed)));
}

#[test]
fn ctrl_d_with_text_deletes_forward() {
    let mut editor = Editor::new();
    // "abc", Left, Left, Ctrl-D -> ac
    let (result, _) = drive(&mut editor, "> ", b"abc\x1b[D\x1b[D\x04\r");
    assert_eq!(result.unwrap(), "ac");
}

#[test]
fn ctrl_c_on_empty_buffer_cancels() {
    let mut editor = Editor::new();
    let (result, output) = drive(&mut editor, "> ", b"\x03");
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(output_text(&output).contains("^C"));
}

#[test]
fn ctrl_c_with_text_restarts_the_line() {
    let mut editor = Editor::new();
    let (result, output) = drive(&mut editor, "> ", b"oops\x03fine\r");
    assert_eq!(result.unwrap(), "fine");
    assert!(output_text(&output).contains("^C\r\n"));
}

#[test]
fn external_cancel_flag_interrupts() {
    let mut editor = Editor::new();
    let handle = editor.cancel_handle();
    handle.cancel();
    let (result, _) = drive(&mut editor, "> ", b"unused\r");
    // The flag is observed before the first read.
    assert!(matches!(result, Err(Error::Cancelled)));
}

// ── History ──────────────────────────────────────────────────────────

#[test]
fn history_navigation_up_up_down() {
    let mut editor = Editor::new();
    editor.history_add("one");
    editor.history_add("two");
    let (result, _) = drive(&mut editor, "> ", b"\x1b[A\x1b[A\x1b[B\r");
    assert_eq!(result.unwrap(), "two");
}

#[test]
fn history_preserves_in_progress_edit() {
    let mut editor = Editor::new();
    editor.history_add("old");
    // Type "new", go up to "old", come back down: "new" is preserved.
    let (result, _) = drive(&mut editor, "> ", b"new\x1b[A\x1b[B\r");
    assert_eq!(result.unwrap(), "new");
}

#[test]
fn history_ctrl_p_and_ctrl_n() {
    let mut editor = Editor::new();
    editor.history_add("alpha");
    editor.history_add("beta");
    let (result, _) = drive(&mut editor, "> ", b"\x10\x10\x0e\r");
    assert_eq!(result.unwrap(), "beta");
}

#[test]
fn history_up_clamps_at_oldest() {
    let mut editor = Editor::new();
    editor.history_add("only");
    let (result, _) = drive(&mut editor, "> ", b"\x1b[A\x1b[A\x1b[A\r");
    assert_eq!(result.unwrap(), "only");
}

#[test]
fn sentinel_is_released_after_the_session() {
    let mut editor = Editor::new();
    editor.history_add("kept");
    let before = editor.history_len();
    let (result, _) = drive(&mut editor, "> ", b"typed\r");
    assert_eq!(result.unwrap(), "typed");
    assert_eq!(editor.history_len(), before);
}

// ── Completion ───────────────────────────────────────────────────────

fn hello_completer(line: &str, _cursor: usize, out: &mut promptline::Completions) {
    if line.starts_with("he") {
        out.add("hello", "hello", 5);
    }
}

#[test]
fn single_candidate_completes_with_trailing_space() {
    let mut editor = Editor::new();
    editor.set_completion(hello_completer);
    let (result, _) = drive(&mut editor, "> ", b"he\t\r");
    assert_eq!(result.unwrap(), "hello ");
}

#[test]
fn directory_candidate_gets_no_trailing_space() {
    let mut editor = Editor::new();
    editor.set_completion(|line, _cursor, out| {
        if line.starts_with("s") {
            out.add("src/", "src/", 4);
        }
    });
    let (result, _) = drive(&mut editor, "> ", b"s\t\r");
    assert_eq!(result.unwrap(), "src/");
}

#[test]
fn no_candidates_beeps_and_continues() {
    let mut editor = Editor::new();
    editor.set_completion(|_line, _cursor, _out| {});
    let (result, output) = drive(&mut editor, "> ", b"xy\t\r");
    assert_eq!(result.unwrap(), "xy");
    assert!(output.contains(&0x07), "expected a bell byte");
}

#[test]
fn multiple_candidates_insert_common_prefix_and_list() {
    let mut editor = Editor::new();
    editor.set_completion(|line, _cursor, out| {
        if line.starts_with("he") {
            out.add("hello", "hello", 5);
            out.add("help", "help", 4);
        }
    });
    let (result, output) = drive(&mut editor, "> ", b"he\t\r");
    // Common prefix "hel" was inserted; ENTER accepts it.
    assert_eq!(result.unwrap(), "hel");
    let text = output_text(&output);
    assert!(text.contains("hello"), "listing shown: {text:?}");
    assert!(text.contains("help"));
}

#[test]
fn tab_rotation_cycles_candidates() {
    let mut editor = Editor::new();
    editor.set_completion(|line, _cursor, out| {
        if line.starts_with("he") {
            out.add("hello", "hello", 5);
            out.add("help", "help", 4);
        }
    });
    // First TAB: prefix + listing. Second TAB: first candidate.
    let (result, _) = drive(&mut editor, "> ", b"he\t\t\r");
    assert_eq!(result.unwrap(), "hello");

    // Third TAB moves to the second candidate.
    let (result, _) = drive(&mut editor, "> ", b"he\t\t\t\r");
    assert_eq!(result.unwrap(), "help");

    // Rotation wraps around.
    let (result, _) = drive(&mut editor, "> ", b"he\t\t\t\t\r");
    assert_eq!(result.unwrap(), "hello");
}

#[test]
fn large_candidate_set_asks_before_listing() {
    let mut editor = Editor::new();
    editor.set_completion(|_line, _cursor, out| {
        for i in 0..120 {
            out.add(format!("cand{i:03}"), format!("cand{i:03}"), 7);
        }
    });
    let (result, output) = drive(&mut editor, "> ", b"\ty\t\r");
    let text = output_text(&output);
    assert!(text.contains("Display all 120 possibilities? (y or n)"));
    // 'y' printed the listing, next TAB selected the first candidate.
    assert!(text.contains("cand000"));
    assert_eq!(result.unwrap(), "cand000");
}

#[test]
fn large_candidate_set_listing_can_be_suppressed() {
    let mut editor = Editor::new();
    editor.set_completion(|_line, _cursor, out| {
        for i in 0..150 {
            out.add(format!("x{i}"), format!("x{i}"), 2);
        }
    });
    let (result, output) = drive(&mut editor, "> ", b"\tn\t\r");
    let text = output_text(&output);
    assert!(text.contains("Display all 150 possibilities?"));
    // Candidates never listed, but rotation still works.
    assert!(!text.contains("x149  "));
    assert_eq!(result.unwrap(), "x0");
}

// ── Reverse search ───────────────────────────────────────────────────

#[test]
fn reverse_search_finds_and_accepts() {
    let mut editor = Editor::new();
    editor.history_add("echo hello");
    editor.history_add("ls -la");
    let (result, output) = drive(&mut editor, "> ", b"\x12ech\r");
    assert_eq!(result.unwrap(), "echo hello");
    assert!(output_text(&output).contains("(reverse-i-search`ech'): "));
}

#[test]
fn repeated_ctrl_r_steps_to_older_matches() {
    let mut editor = Editor::new();
    editor.history_add("echo one");
    editor.history_add("filler");
    editor.history_add("echo two");
    let (result, _) = drive(&mut editor, "> ", b"\x12echo\x12\r");
    assert_eq!(result.unwrap(), "echo one");
}

#[test]
fn search_backspace_rewinds_to_recent_match() {
    let mut editor = Editor::new();
    editor.history_add("grep old");
    editor.history_add("grep new");
    // "grep o" matches the older entry; backspace makes it "grep " and
    // the newer entry matches again.
    let (result, _) = drive(&mut editor, "> ", b"\x12grep o\x7f\r");
    assert_eq!(result.unwrap(), "grep new");
}

#[test]
fn search_cancel_restores_original_line() {
    let mut editor = Editor::new();
    editor.history_add("echo hello");
    let (result, output) = drive(&mut editor, "> ", b"xy\x12ech\x03\r");
    assert_eq!(result.unwrap(), "xy");
    assert!(output_text(&output).contains("^C"));
}

#[test]
fn search_exit_key_is_reprocessed_by_normal_mode() {
    let mut editor = Editor::new();
    editor.history_add("older");
    editor.history_add("match me");
    // Exit search with UP: the matched entry stays and UP then browses
    // older history from that point.
    let (result, _) = drive(&mut editor, "> ", b"\x12match\x1b[A\r");
    assert_eq!(result.unwrap(), "older");
}

#[test]
fn failed_search_beeps() {
    let mut editor = Editor::new();
    editor.history_add("nothing here");
    let (result, output) = drive(&mut editor, "> ", b"\x12zzz\x03\r");
    assert_eq!(result.unwrap(), "");
    assert!(output.contains(&0x07));
}

// ── Escape disambiguation ────────────────────────────────────────────

#[test]
fn esc_sequence_within_deadline_is_one_key() {
    let mut editor = Editor::new();
    editor.history_add("prev");
    // ESC [ A delivered together: a single Up event.
    let (result, _) = drive(&mut editor, "> ", b"\x1b[A\r");
    assert_eq!(result.unwrap(), "prev");
}

#[test]
fn lone_esc_resolves_after_deadline() {
    // ESC with a continuation arriving past the 50 ms deadline: the ESC
    // key fires first (NORMAL ignores it) and the late "[A" still
    // completes as an Up event, which recalls history.
    let mut editor = Editor::new();
    editor.history_add("recalled");
    let (session_in, mut feeder) = UnixStream::pair().unwrap();
    let (session_out, _capture) = UnixStream::pair().unwrap();

    let writer = std::thread::spawn(move || {
        feeder.write_all(b"\x1b").unwrap();
        std::thread::sleep(Duration::from_millis(120));
        feeder.write_all(b"[A\r").unwrap();
    });

    let result = {
        let mut session = editor
            .edit_start(session_in.as_fd(), session_out.as_fd(), "> ")
            .unwrap();
        let result = loop {
            match session.step() {
                Ok(Step::Line(line)) => break line,
                Ok(Step::Pending) => std::thread::sleep(Duration::from_millis(2)),
                Err(err) => panic!("unexpected error: {err}"),
            }
        };
        session.finish().unwrap();
        result
    };
    writer.join().unwrap();

    assert_eq!(result, "recalled");
}

// ── Async stepping ───────────────────────────────────────────────────

#[test]
fn async_session_reports_pending_then_line() {
    let mut editor = Editor::new();
    let (session_in, mut feeder) = UnixStream::pair().unwrap();
    let (session_out, _capture) = UnixStream::pair().unwrap();
    session_in.set_nonblocking(true).unwrap();

    let mut session = editor
        .edit_start(session_in.as_fd(), session_out.as_fd(), "> ")
        .unwrap();

    assert_eq!(session.step().unwrap(), Step::Pending);

    feeder.write_all(b"ab").unwrap();
    // Wait for the bytes to be visible on the socket.
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(session.step().unwrap(), Step::Pending);

    feeder.write_all(b"\r").unwrap();
    std::thread::sleep(Duration::from_millis(10));
    let step = session.step().unwrap();
    assert_eq!(step, Step::Line("ab".to_string()));
    session.finish().unwrap();
}

#[test]
fn async_cancel_is_observed_between_steps() {
    let mut editor = Editor::new();
    let handle = editor.cancel_handle();
    let (session_in, _feeder) = UnixStream::pair().unwrap();
    let (session_out, _capture) = UnixStream::pair().unwrap();
    session_in.set_nonblocking(true).unwrap();

    let mut session = editor
        .edit_start(session_in.as_fd(), session_out.as_fd(), "> ")
        .unwrap();
    assert_eq!(session.step().unwrap(), Step::Pending);

    handle.cancel();
    assert!(matches!(session.step(), Err(Error::Cancelled)));
    session.finish().unwrap();
}

// ── Display modes ────────────────────────────────────────────────────

#[test]
fn multiline_wrap_at_exact_width_opens_fresh_row() {
    let mut editor = Editor::new();
    editor.set_multiline(true);
    // Default width on pipes is 80; prompt "> " is 2 columns. 78 typed
    // characters land exactly on the boundary with the cursor at the
    // end, which must emit a fresh-row newline.
    let line: Vec<u8> = std::iter::repeat(b'x')
        .take(78)
        .chain(*b"\r")
        .collect();
    let (result, output) = drive(&mut editor, "> ", &line);
    assert_eq!(result.unwrap().len(), 78);
    assert!(
        output.windows(2).any(|w| w == b"\n\r"),
        "expected a wrap newline in the refresh output"
    );
}

#[test]
fn multiline_session_accepts_edits() {
    let mut editor = Editor::new();
    editor.set_multiline(true);
    let (result, _) = drive(&mut editor, "> ", b"abc\x1b[D\x1b[Dx\r");
    assert_eq!(result.unwrap(), "axbc");
}

#[test]
fn non_tty_read_line_is_plain() {
    // read_line_from on a pipe bypasses the editor entirely and reads
    // one LF-terminated line.
    let mut editor = Editor::new();
    let (input, mut feeder) = UnixStream::pair().unwrap();
    feeder.write_all(b"plain line\r\nrest").unwrap();
    let (output, _sink) = UnixStream::pair().unwrap();
    let line = editor
        .read_line_from(input.as_fd(), output.as_fd(), "> ")
        .unwrap();
    assert_eq!(line, "plain line");
}

#[test]
fn blacklisted_terminal_is_detected() {
    // Only this test touches TERM; the socket-driven sessions above
    // never consult it because their descriptors are not terminals.
    let old = std::env::var("TERM").ok();
    std::env::set_var("TERM", "dumb");
    assert!(promptline::is_unsupported_term());
    std::env::set_var("TERM", "xterm-256color");
    assert!(!promptline::is_unsupported_term());
    match old {
        Some(v) => std::env::set_var("TERM", v),
        None => std::env::remove_var("TERM"),
    }
}

#[test]
fn ctrl_l_clears_screen_and_repaints() {
    let mut editor = Editor::new();
    let (result, output) = drive(&mut editor, "> ", b"abc\x0c\r");
    assert_eq!(result.unwrap(), "abc");
    let text = output_text(&output);
    assert!(text.contains("\x1b[H\x1b[2J"));
    // The line is repainted after the clear.
    let clear_pos = text.find("\x1b[2J").unwrap();
    assert!(text[clear_pos..].contains("> abc"));
}

#[test]
fn single_line_refresh_erases_to_end_of_line() {
    let mut editor = Editor::new();
    let (result, output) = drive(&mut editor, "> ", b"abcd\x7f\r");
    assert_eq!(result.unwrap(), "abc");
    // The backspace refresh must erase the stale trailing character.
    assert!(output_text(&output).contains("\x1b[0K"));
}
