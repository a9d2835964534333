//! Transport layer: the byte-link seam, frame emission, sequence
//! multiplexing, the reader thread, the event fan-out socket, and the
//! catalog discovery handshake.

pub(crate) mod discovery;
pub mod events;
pub(crate) mod reader;
pub mod sequence;

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serialport::SerialPort;

use crate::error::{HalError, Result};
use crate::protocol::{encode_frame, Message};

/// Byte transport under the engine.
///
/// The real implementation is a serial port; integration tests plug in an
/// in-memory duplex. `try_clone_link` yields an independent handle to the
/// same underlying stream so the reader thread can own its read half while
/// writers share the other.
pub trait Link: Read + Write + Send {
    fn try_clone_link(&self) -> io::Result<Box<dyn Link>>;
}

impl Link for Box<dyn SerialPort> {
    fn try_clone_link(&self) -> io::Result<Box<dyn Link>> {
        self.try_clone()
            .map(|port| Box::new(port) as Box<dyn Link>)
            .map_err(io::Error::other)
    }
}

/// Write half of the link plus the TX byte counter.
///
/// Shared by requesters, the reader's PING echo, and the discovery
/// handshake so every outbound frame goes through the same serialized
/// path and is accounted the same way.
pub(crate) struct TxPort {
    port: Mutex<Box<dyn Link>>,
    tx_bytes: AtomicU64,
}

impl TxPort {
    pub fn new(link: Box<dyn Link>) -> Self {
        Self {
            port: Mutex::new(link),
            tx_bytes: AtomicU64::new(0),
        }
    }

    /// Encode and emit one frame. Whole frames only; the lock guarantees
    /// two writers never interleave bytes.
    pub fn send(&self, msg: &Message) -> Result<()> {
        let frame = encode_frame(msg);

        let mut port = self.port.lock().map_err(|_| HalError::Lock)?;
        port.write_all(&frame).map_err(HalError::Write)?;
        port.flush().map_err(HalError::Write)?;
        self.tx_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);

        tracing::trace!(
            seq = msg.seq,
            cmd = msg.cmd,
            rid = msg.rid,
            len = msg.data.len(),
            wire = frame.len(),
            "TX frame"
        );
        Ok(())
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }
}

/// Timed read treating timeout-ish conditions as "no data this tick".
pub(crate) fn read_available(link: &mut dyn Link, buf: &mut [u8]) -> io::Result<usize> {
    match link.read(buf) {
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(e) => Err(e),
    }
}
