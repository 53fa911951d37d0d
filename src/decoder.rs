#![forbid(unsafe_code)]

//! Input decoder state machine.
//!
//! Turns the raw terminal byte stream into [`Key`] events: printable
//! characters (multi-byte in the session's encoding), the named control
//! keys, and the editing keys hidden inside ESC/CSI/SS sequences.
//!
//! # Escape disambiguation
//!
//! A lone ESC keypress and the first byte of an arrow-key sequence are
//! identical on the wire. After a bare ESC the decoder reports that a
//! deadline is needed ([`Decoder::awaiting_escape`]); the read loop waits
//! up to [`ESC_TIMEOUT`] for a continuation byte and calls
//! [`Decoder::escape_timeout`] if none arrives, which resolves the ESC as
//! a real key.
//!
//! # Pushback
//!
//! A small LIFO of key events delivered before any further reading. Mode
//! transitions use it to re-dispatch the key that triggered them, and
//! sequence-buffer overflow uses it to replay swallowed printable bytes.

use std::time::Duration;

use crate::encoding::Encoding;
use crate::event::{CharBytes, Key};

/// How long a bare ESC may dangle before it becomes a real ESC key.
pub(crate) const ESC_TIMEOUT: Duration = Duration::from_millis(50);

/// Escape sequences longer than this are abandoned and replayed as text.
const ESCAPE_BUF_MAX: usize = 32;

/// Capacity of the pushback stack.
const PUSHBACK_MAX: usize = 32;

/// Decoder sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Plain input.
    #[default]
    Ground,
    /// After a bare ESC; the disambiguation deadline is live here.
    Escape,
    /// A timed-out ESC was already delivered as a key, but a straggling
    /// continuation may still complete its sequence.
    EscapeResolved,
    /// Inside `ESC [`, collecting parameter bytes.
    CsiParam,
    /// Inside `ESC [`, collecting intermediate bytes after the parameters.
    CsiInter,
    /// After `ESC N` / `ESC O`; the next byte is the whole selector.
    Ss,
    /// Collecting the continuation bytes of one multi-byte character.
    Collect { have: u8, need: u8 },
}

/// Result of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feed {
    /// A complete key event.
    Key(Key),
    /// The byte was consumed; more bytes are needed.
    Pending,
    /// The byte was consumed and produced nothing (filtered input or an
    /// unrecognized sequence).
    None,
}

#[derive(Debug, Default)]
pub(crate) struct Decoder {
    state: State,
    /// Escape-sequence bytes after the introducing ESC.
    seq: Vec<u8>,
    /// Partial multi-byte character.
    char_buf: [u8; 4],
    char_len: u8,
    pushback: Vec<Key>,
}

impl Decoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push a key to be delivered before any further byte is read.
    /// Most-recently-pushed wins (LIFO).
    pub(crate) fn push_back(&mut self, key: Key) {
        if self.pushback.len() < PUSHBACK_MAX {
            self.pushback.push(key);
        }
    }

    /// Take the next pushed-back key, if any.
    pub(crate) fn pop_pushback(&mut self) -> Option<Key> {
        self.pushback.pop()
    }

    /// True while a bare ESC is pending and the disambiguation deadline
    /// applies to the next read.
    pub(crate) fn awaiting_escape(&self) -> bool {
        self.state == State::Escape && self.seq.is_empty()
    }

    /// Resolve a dangling ESC after the deadline expired with no
    /// continuation byte. The ESC key event is delivered now; should the
    /// continuation still trickle in later, the sequence completes and
    /// produces its own event as well.
    pub(crate) fn escape_timeout(&mut self) -> Key {
        debug_assert!(self.awaiting_escape());
        self.state = State::EscapeResolved;
        self.seq.clear();
        Key::Esc
    }

    /// Feed one byte through the state machine.
    pub(crate) fn feed(&mut self, byte: u8, encoding: &dyn Encoding) -> Feed {
        match self.state {
            State::Ground => self.feed_ground(byte, encoding),
            State::Escape => self.feed_escape(byte),
            State::EscapeResolved => self.feed_escape_resolved(byte, encoding),
            State::CsiParam => self.feed_csi_param(byte),
            State::CsiInter => self.feed_csi_inter(byte),
            State::Ss => self.feed_ss(byte),
            State::Collect { have, need } => self.feed_collect(byte, have, need),
        }
    }

    /// After a timed-out ESC: sequence introducers still open their
    /// sequence; anything else is ordinary input again.
    fn feed_escape_resolved(&mut self, byte: u8, encoding: &dyn Encoding) -> Feed {
        match byte {
            b'[' => {
                self.seq.push(byte);
                self.state = State::CsiParam;
                Feed::Pending
            }
            b'N' | b'O' => {
                self.seq.push(byte);
                self.state = State::Ss;
                Feed::Pending
            }
            _ => {
                self.state = State::Ground;
                self.feed(byte, encoding)
            }
        }
    }

    fn feed_ground(&mut self, byte: u8, encoding: &dyn Encoding) -> Feed {
        match byte {
            0x1B => {
                self.state = State::Escape;
                self.seq.clear();
                Feed::Pending
            }
            // Named controls and DEL.
            0x00..=0x1F | 0x7F => match Key::from_control_byte(byte) {
                Some(key) => Feed::Key(key),
                None => Feed::None,
            },
            // Plain printable ASCII.
            0x20..=0x7E => Feed::Key(Key::Char(CharBytes::single(byte))),
            // C1 controls are filtered like unrecognized C0 controls.
            0x80..=0x9F => Feed::None,
            // High bytes: one character of `encoding.code_len` bytes.
            _ => {
                let need = encoding.code_len(byte);
                if need <= 1 {
                    return Feed::Key(Key::Char(CharBytes::single(byte)));
                }
                self.char_buf[0] = byte;
                self.char_len = 1;
                self.state = State::Collect {
                    have: 1,
                    need: need.min(4) as u8,
                };
                Feed::Pending
            }
        }
    }

    fn feed_escape(&mut self, byte: u8) -> Feed {
        match byte {
            b'[' => {
                self.seq.push(byte);
                self.state = State::CsiParam;
                Feed::Pending
            }
            b'N' | b'O' => {
                self.seq.push(byte);
                self.state = State::Ss;
                Feed::Pending
            }
            // Intermediate bytes keep the sequence open.
            0x20..=0x2F => {
                self.seq.push(byte);
                if self.overflowed() {
                    return self.abandon_sequence();
                }
                Feed::Pending
            }
            // Any other final byte completes an ESC sequence we do not
            // recognize; drop it.
            0x30..=0x7E => {
                self.reset();
                Feed::None
            }
            // ESC restarts.
            0x1B => {
                self.seq.clear();
                Feed::Pending
            }
            _ => {
                self.reset();
                Feed::None
            }
        }
    }

    fn feed_csi_param(&mut self, byte: u8) -> Feed {
        self.seq.push(byte);
        if self.overflowed() {
            return self.abandon_sequence();
        }
        match byte {
            // Parameter bytes.
            0x30..=0x3F => Feed::Pending,
            // Intermediate bytes.
            0x20..=0x2F => {
                self.state = State::CsiInter;
                Feed::Pending
            }
            // Final byte.
            0x40..=0x7E => self.finish_csi(),
            _ => {
                self.reset();
                Feed::None
            }
        }
    }

    fn feed_csi_inter(&mut self, byte: u8) -> Feed {
        self.seq.push(byte);
        if self.overflowed() {
            return self.abandon_sequence();
        }
        match byte {
            0x20..=0x2F => Feed::Pending,
            0x40..=0x7E => self.finish_csi(),
            _ => {
                self.reset();
                Feed::None
            }
        }
    }

    fn feed_ss(&mut self, byte: u8) -> Feed {
        self.reset();
        match byte {
            b'A' => Feed::Key(Key::Up),
            b'B' => Feed::Key(Key::Down),
            b'C' => Feed::Key(Key::Right),
            b'D' => Feed::Key(Key::Left),
            b'H' => Feed::Key(Key::Home),
            b'F' => Feed::Key(Key::End),
            _ => Feed::None,
        }
    }

    fn feed_collect(&mut self, byte: u8, have: u8, need: u8) -> Feed {
        self.char_buf[have as usize] = byte;
        self.char_len = have + 1;
        if self.char_len == need {
            let key = Key::Char(CharBytes::new(&self.char_buf[..need as usize]));
            self.reset();
            Feed::Key(key)
        } else {
            self.state = State::Collect {
                have: have + 1,
                need,
            };
            Feed::Pending
        }
    }

    fn finish_csi(&mut self) -> Feed {
        // seq = '[' params/intermediates final
        let body = &self.seq[1..];
        let (final_byte, params) = match body.split_last() {
            Some(split) => split,
            None => {
                self.reset();
                return Feed::None;
            }
        };
        let key = match (params, *final_byte) {
            ([], b'A') => Some(Key::Up),
            ([], b'B') => Some(Key::Down),
            ([], b'C') => Some(Key::Right),
            ([], b'D') => Some(Key::Left),
            ([], b'F') => Some(Key::End),
            ([], b'H') => Some(Key::Home),
            (b"1", b'~') => Some(Key::Home),
            (b"3", b'~') => Some(Key::Delete),
            (b"4", b'~') => Some(Key::End),
            _ => None,
        };
        self.reset();
        match key {
            Some(key) => Feed::Key(key),
            None => Feed::None,
        }
    }

    fn overflowed(&self) -> bool {
        self.seq.len() > ESCAPE_BUF_MAX
    }

    /// Give up on an oversized sequence: replay its printable bytes as
    /// text through the pushback stack, oldest first.
    fn abandon_sequence(&mut self) -> Feed {
        let seq = std::mem::take(&mut self.seq);
        self.state = State::Ground;
        for &byte in seq.iter().rev() {
            if (0x20..=0x7E).contains(&byte) {
                self.push_back(Key::Char(CharBytes::single(byte)));
            }
        }
        Feed::None
    }

    fn reset(&mut self) {
        self.state = State::Ground;
        self.seq.clear();
        self.char_len = 0;
    }
}
