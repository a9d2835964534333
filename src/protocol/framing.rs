//! Byte-level frame encoding.
//!
//! A frame on the wire is three SYNC bytes followed by the escaped body
//! `chk, seq, cmd, rid, len, data[0..len]`. Any body byte equal to SYNC or
//! ESC is preceded by ESC; the byte after an ESC is always a literal value.
//! SYNC therefore never appears unescaped inside a body, which lets the
//! decoder resynchronize on the next triple-SYNC after line noise.

use crate::protocol::message::Message;
use bytes::{BufMut, BytesMut};

/// Frame delimiter; never appears unescaped in a body.
pub const SYNC: u8 = 0xFF;

/// Escape introducer; the following byte is the literal value.
pub const ESC: u8 = 0xAA;

/// Number of consecutive SYNC bytes delimiting a frame.
pub const PREAMBLE_LEN: usize = 3;

fn put_escaped(buf: &mut BytesMut, byte: u8) {
    if byte == SYNC || byte == ESC {
        buf.put_u8(ESC);
    }
    buf.put_u8(byte);
}

/// Encode a complete frame: preamble plus escaped body.
///
/// The returned buffer length is the exact number of bytes to emit on the
/// wire (and to account in the TX counter).
pub fn encode_frame(msg: &Message) -> BytesMut {
    debug_assert!(msg.data.len() <= crate::protocol::message::MAX_PAYLOAD);

    let mut frame = BytesMut::with_capacity(PREAMBLE_LEN + 2 * (5 + msg.data.len()));
    frame.put_bytes(SYNC, PREAMBLE_LEN);

    put_escaped(&mut frame, msg.checksum());
    put_escaped(&mut frame, msg.seq);
    put_escaped(&mut frame, msg.cmd);
    put_escaped(&mut frame, msg.rid);
    put_escaped(&mut frame, msg.data.len() as u8);
    for &b in &msg.data {
        put_escaped(&mut frame, b);
    }

    frame
}
