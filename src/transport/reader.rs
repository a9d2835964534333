//! The inbound reader thread.
//!
//! Exactly one reader owns the read half of the link. It polls with timed
//! reads, feeds every byte to the frame parser, and dispatches completed
//! frames: driver-sequence frames release the matching waiter, device-
//! sequence frames run the built-in handlers. Frame-level damage is logged
//! and skipped; only the `running` flag ends the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::protocol::{Command, FrameParser, Message, SEQ_MASK};
use crate::transport::events::EventSocket;
use crate::transport::sequence::SequenceTable;
use crate::transport::{read_available, Link, TxPort};

/// Everything the reader thread needs, moved into the thread at spawn.
pub(crate) struct Reader {
    pub link: Box<dyn Link>,
    pub tx: Arc<TxPort>,
    pub table: Arc<Mutex<SequenceTable>>,
    pub events: Arc<Mutex<EventSocket>>,
    pub running: Arc<AtomicBool>,
    pub rx_bytes: Arc<AtomicU64>,
    pub trigger_names: Vec<String>,
}

impl Reader {
    pub fn run(mut self) {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 1024];

        tracing::debug!("reader thread started");

        while self.running.load(Ordering::Relaxed) {
            if let Ok(mut events) = self.events.lock() {
                events.accept_pending();
            }

            let n = match read_available(self.link.as_mut(), &mut buf) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("serial read failed: {e}");
                    continue;
                }
            };
            self.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);

            for &byte in &buf[..n] {
                match parser.feed(byte) {
                    Ok(Some(msg)) => self.dispatch(msg),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("dropping damaged frame: {e}"),
                }
            }
        }

        tracing::debug!("reader thread exited");
    }

    fn dispatch(&self, msg: Message) {
        tracing::trace!(
            seq = msg.seq,
            cmd = msg.cmd,
            rid = msg.rid,
            len = msg.data.len(),
            "RX frame"
        );

        if !msg.is_device_origin() {
            let seq = msg.seq & SEQ_MASK;
            let delivered = match self.table.lock() {
                Ok(mut table) => table.complete(seq, msg),
                Err(_) => {
                    tracing::error!("sequence table poisoned, dropping response");
                    return;
                }
            };
            if !delivered {
                tracing::debug!(seq, "response with no waiter, dropped");
            }
            return;
        }

        match msg.command() {
            Some(Command::Ping) => {
                // Heartbeat: the device expects its frame straight back.
                if let Err(e) = self.tx.send(&msg) {
                    tracing::warn!("ping echo failed: {e}");
                }
            }
            Some(Command::Boot) => {
                tracing::warn!("device rebooted");
            }
            Some(Command::Trigger) if msg.is_change() => {
                let Some(name) = self.trigger_names.get(msg.rid as usize) else {
                    tracing::debug!(rid = msg.rid, "trigger event for unknown resource");
                    return;
                };
                let state = if msg.data.first().copied().unwrap_or(0) != 0 {
                    '1'
                } else {
                    '0'
                };
                let line = format!("{name}:{state}\n");
                tracing::debug!(trigger = %name, state = %state, "trigger event");
                if let Ok(mut events) = self.events.lock() {
                    events.broadcast(&line);
                }
            }
            _ => {
                tracing::trace!(cmd = msg.cmd, "ignoring device frame");
            }
        }
    }
}
