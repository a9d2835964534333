//! Serial request/response engine for microcontroller peripheral HALs.
//!
//! A board exposes its peripherals (sensors, triggers, switches, LED
//! animations) over a half-duplex UART. This crate is the host side of
//! that link: it discovers the board's resource catalog, multiplexes
//! concurrent requests over a 7-bit sequence window, and fans unsolicited
//! trigger events out to local listeners, so a filesystem front-end can
//! map file reads and writes onto single protocol requests.
//!
//! # Architecture
//!
//! The library is organized into three layers:
//!
//! - **API layer** (`api`): strongly-typed resource operations and the
//!   discovered catalog. Zero knowledge of framing or threads.
//!
//! - **Transport layer** (`transport`): the sequence table, the single
//!   reader thread that routes responses to waiters and events to the
//!   fan-out socket, and the discovery handshake.
//!
//! - **Protocol layer** (`protocol`): pure message records, frame
//!   encoding with SYNC preamble and byte escaping, and the streaming
//!   checksum-verified decoder.
//!
//! # Example
//!
//! ```no_run
//! use hal_link::Hal;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hal = Hal::connect("/dev/ttyACM0", Path::new("/tmp/hal-events.sock"))?;
//!     println!("firmware: {}", hal.firmware_version());
//!     hal.set_switch(0, true)?;
//!     hal.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;

pub use api::{Hal, ResourceCatalog, Rgb};
pub use connection::{Connection, HalConfig};
pub use error::{HalError, Result};
pub use protocol::{Command, Message};
pub use transport::Link;
