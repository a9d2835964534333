//! Streaming frame decoder.
//!
//! Feeds one byte at a time and yields complete, checksum-verified
//! messages. All decode errors are recoverable: the parser discards the
//! partial frame and hunts for the next triple-SYNC preamble, so a noisy
//! line costs frames but never wedges the reader.

use crate::error::{HalError, Result};
use crate::protocol::framing::{ESC, PREAMBLE_LEN, SYNC};
use crate::protocol::message::{wire_checksum, Message};

const HEADER_LEN: usize = 5;

#[derive(Debug)]
enum State {
    /// Counting consecutive SYNC bytes. Extra SYNCs beyond three stay part
    /// of the preamble; the first non-SYNC byte opens the body.
    Hunt { run: usize },

    /// Accumulating unescaped body bytes: 5 header bytes, then `len`
    /// payload bytes.
    Body {
        header: [u8; HEADER_LEN],
        have: usize,
        data: Vec<u8>,
        escaped: bool,
    },
}

/// Byte-at-a-time decoder for inbound frames.
#[derive(Debug)]
pub struct FrameParser {
    state: State,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: State::Hunt { run: 0 },
        }
    }

    /// Feed one byte.
    ///
    /// Returns `Ok(Some(msg))` when a frame completes, `Ok(None)` while
    /// accumulating, and an error when the frame in progress is damaged:
    /// `OutOfSync` for an unescaped SYNC mid-body, `Checksum` when the
    /// recomputed sum disagrees with the frame's `chk`. After an error the
    /// parser is back in the hunt state and the caller just keeps feeding.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Message>> {
        match &mut self.state {
            State::Hunt { run } => {
                if byte == SYNC {
                    *run = (*run + 1).min(PREAMBLE_LEN);
                    Ok(None)
                } else if *run >= PREAMBLE_LEN {
                    self.state = State::Body {
                        header: [0; HEADER_LEN],
                        have: 0,
                        data: Vec::new(),
                        escaped: false,
                    };
                    self.feed_body(byte)
                } else {
                    *run = 0;
                    Ok(None)
                }
            }
            State::Body { .. } => self.feed_body(byte),
        }
    }

    fn feed_body(&mut self, byte: u8) -> Result<Option<Message>> {
        let State::Body { escaped, .. } = &mut self.state else {
            unreachable!("feed_body outside body");
        };
        if *escaped {
            // Byte after ESC is a literal, whatever its value.
            self.push_byte(byte)
        } else if byte == ESC {
            *escaped = true;
            Ok(None)
        } else if byte == SYNC {
            // Partial frame is dropped with the state; this SYNC counts
            // toward the next preamble.
            self.state = State::Hunt { run: 1 };
            Err(HalError::OutOfSync)
        } else {
            self.push_byte(byte)
        }
    }

    fn push_byte(&mut self, byte: u8) -> Result<Option<Message>> {
        let State::Body {
            header,
            have,
            data,
            escaped,
        } = &mut self.state
        else {
            unreachable!("push_byte outside body");
        };
        *escaped = false;

        if *have < HEADER_LEN {
            header[*have] = byte;
            *have += 1;
        } else {
            data.push(byte);
        }

        let len = header[4] as usize;
        if *have == HEADER_LEN && data.len() == len {
            return self.finish();
        }
        Ok(None)
    }

    fn finish(&mut self) -> Result<Option<Message>> {
        let State::Body { header, data, .. } =
            std::mem::replace(&mut self.state, State::Hunt { run: 0 })
        else {
            unreachable!("finish outside body");
        };

        let [chk, seq, cmd, rid, _len] = header;
        let actual = wire_checksum(seq, cmd, rid, &data);
        if actual != chk {
            return Err(HalError::Checksum {
                expected: chk,
                actual,
            });
        }

        Ok(Some(Message {
            seq,
            cmd,
            rid,
            data,
        }))
    }

    /// Drop any frame in progress and hunt for the next preamble.
    pub fn reset(&mut self) {
        self.state = State::Hunt { run: 0 };
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
