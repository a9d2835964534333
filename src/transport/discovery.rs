//! Resource catalog discovery.
//!
//! Runs before the reader thread starts, so the caller is the only
//! consumer of the inbound stream. The device announces itself with a
//! BOOT frame; the driver then asks for the firmware version and the
//! resource tree. A BOOT arriving anywhere after the first restarts the
//! exchange (the device reset mid-handshake).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::api::catalog::ResourceCatalog;
use crate::error::{HalError, Result};
use crate::protocol::{Command, FrameParser, Message};
use crate::transport::{read_available, Link, TxPort};

/// Firmware version replies carry at least this many bytes.
const VERSION_LEN: usize = 40;

/// Resource categories announced in the tree exchange.
const TREE_CATEGORIES: usize = 4;

/// Pulls whole frames off the link, one at a time, with a per-frame
/// deadline. Bytes read past a completed frame are kept for the next call
/// (tree replies arrive back to back).
struct FrameSource<'a> {
    link: &'a mut dyn Link,
    rx_bytes: &'a AtomicU64,
    parser: FrameParser,
    pending: Vec<u8>,
    consumed: usize,
}

impl<'a> FrameSource<'a> {
    fn new(link: &'a mut dyn Link, rx_bytes: &'a AtomicU64) -> Self {
        Self {
            link,
            rx_bytes,
            parser: FrameParser::new(),
            pending: Vec::new(),
            consumed: 0,
        }
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            while self.consumed < self.pending.len() {
                let byte = self.pending[self.consumed];
                self.consumed += 1;
                // Handshake frames are expected to be clean; any decode
                // error fails discovery and the caller closes the port.
                if let Some(msg) = self.parser.feed(byte)? {
                    return Ok(msg);
                }
            }
            self.pending.clear();
            self.consumed = 0;

            if Instant::now() >= deadline {
                return Err(HalError::Timeout);
            }
            let n = read_available(self.link, &mut buf).map_err(HalError::Read)?;
            if n > 0 {
                self.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
                self.pending.extend_from_slice(&buf[..n]);
            }
        }
    }
}

/// Run the full discovery handshake and build the catalog.
pub(crate) fn discover(
    link: &mut dyn Link,
    tx: &TxPort,
    rx_bytes: &AtomicU64,
    timeout: Duration,
) -> Result<ResourceCatalog> {
    let mut src = FrameSource::new(link, rx_bytes);

    // The device opens the conversation with BOOT after reset.
    loop {
        let msg = src.next_frame(timeout)?;
        if msg.command() == Some(Command::Boot) {
            break;
        }
        tracing::trace!(cmd = msg.cmd, "discarding pre-boot frame");
    }

    loop {
        match handshake_round(&mut src, tx, timeout)? {
            Some(catalog) => return Ok(catalog),
            None => tracing::debug!("device rebooted during discovery, restarting handshake"),
        }
    }
}

/// One version + tree exchange. Returns `None` when a BOOT frame
/// interrupts it, meaning the whole round must start over.
fn handshake_round(
    src: &mut FrameSource<'_>,
    tx: &TxPort,
    timeout: Duration,
) -> Result<Option<ResourceCatalog>> {
    tx.send(&Message::ask(Command::Version, 0))?;
    let version = loop {
        let msg = src.next_frame(timeout)?;
        match msg.command() {
            Some(Command::Boot) => return Ok(None),
            Some(Command::Version) => break msg,
            _ => tracing::trace!(cmd = msg.cmd, "discarding frame while awaiting version"),
        }
    };
    if version.data.len() < VERSION_LEN {
        return Err(HalError::Protocol(format!(
            "firmware version reply too short ({} bytes)",
            version.data.len()
        )));
    }
    let version = String::from_utf8_lossy(&version.data[..VERSION_LEN])
        .trim_end_matches(['\0', ' '])
        .to_string();
    tracing::info!(firmware = %version, "device identified");

    let mut catalog = ResourceCatalog::new(version);
    tx.send(&Message::ask(Command::Tree, 0))?;

    for _ in 0..TREE_CATEGORIES {
        let head = loop {
            let msg = src.next_frame(timeout)?;
            match msg.command() {
                Some(Command::Boot) => return Ok(None),
                Some(Command::Tree) => break msg,
                _ => tracing::trace!(cmd = msg.cmd, "discarding frame while awaiting tree"),
            }
        };

        // `rid` carries the resource count, data[0] the category tag.
        let count = head.rid as usize;
        let category = head
            .data
            .first()
            .and_then(|&b| Command::from_byte(b))
            .ok_or_else(|| HalError::Protocol("tree block without category tag".into()))?;
        let names = match category {
            Command::Sensor => &mut catalog.sensors,
            Command::Trigger => &mut catalog.triggers,
            Command::Switch => &mut catalog.switches,
            Command::AnimationFrames => &mut catalog.animations,
            other => {
                return Err(HalError::Protocol(format!(
                    "unknown resource category {:?}",
                    other
                )))
            }
        };
        tracing::info!(count, category = ?category, "loading resources");

        for index in 0..count {
            let msg = src.next_frame(timeout)?;
            if msg.command() == Some(Command::Boot) {
                return Ok(None);
            }
            let name = resource_name(&msg.data);
            tracing::info!(index, name = %name, "loaded resource");
            names.push(name);
        }
    }

    Ok(Some(catalog))
}

/// Payloads are NUL-terminable names.
fn resource_name(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_stops_at_nul() {
        assert_eq!(resource_name(b"doorbell\0junk"), "doorbell");
        assert_eq!(resource_name(b"motion"), "motion");
        assert_eq!(resource_name(b""), "");
    }
}
