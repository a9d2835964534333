//! Engine facade: one serial device, one event socket, one reader thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::api::catalog::ResourceCatalog;
use crate::error::{HalError, Result};
use crate::protocol::Message;
use crate::transport::discovery;
use crate::transport::events::EventSocket;
use crate::transport::reader::Reader;
use crate::transport::sequence::SequenceTable;
use crate::transport::{Link, TxPort};

/// Poll interval for the reader's timed reads; also bounds how quickly
/// `stop_reader` and event-socket accepts are noticed.
const READ_POLL: Duration = Duration::from_millis(100);

/// Configuration for a HAL connection
#[derive(Debug, Clone)]
pub struct HalConfig {
    pub baud_rate: u32,
    /// Hard wall-clock deadline for each `request`.
    pub request_timeout: Duration,
    /// Per-frame deadline during the discovery handshake.
    pub discovery_timeout: Duration,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            request_timeout: Duration::from_millis(500),
            discovery_timeout: Duration::from_secs(10),
        }
    }
}

/// Main connection handle to the device.
///
/// Writers share the TX half behind a mutex; the reader thread owns the RX
/// half. Requests are multiplexed over the 7-bit sequence window and each
/// blocks until its response arrives or the deadline fires.
pub struct Connection {
    tx: Arc<TxPort>,
    /// RX half, parked until the reader claims it. Discovery borrows it.
    reader_link: Mutex<Option<Box<dyn Link>>>,
    table: Arc<Mutex<SequenceTable>>,
    events: Arc<Mutex<EventSocket>>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    rx_bytes: Arc<AtomicU64>,
    started: Instant,
    sock_path: PathBuf,
    config: HalConfig,
}

impl Connection {
    /// Open the serial device and bind the event socket.
    pub fn open(serial_path: &str, socket_path: &Path) -> Result<Self> {
        Self::open_with(serial_path, socket_path, HalConfig::default())
    }

    pub fn open_with(serial_path: &str, socket_path: &Path, config: HalConfig) -> Result<Self> {
        tracing::info!(device = serial_path, "opening HAL serial device");

        let port = serialport::new(serial_path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_POLL)
            .open()?;

        Self::over(port, socket_path, config)
    }

    /// Build a connection over an arbitrary byte link. This is the seam
    /// the serial constructor goes through and what loopback tests use.
    pub fn over(link: impl Link + 'static, socket_path: &Path, config: HalConfig) -> Result<Self> {
        let reader_link = link.try_clone_link()?;
        let events = EventSocket::open(socket_path)?;

        Ok(Self {
            tx: Arc::new(TxPort::new(Box::new(link))),
            reader_link: Mutex::new(Some(reader_link)),
            table: Arc::new(Mutex::new(SequenceTable::new())),
            events: Arc::new(Mutex::new(events)),
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
            rx_bytes: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
            sock_path: socket_path.to_path_buf(),
            config,
        })
    }

    /// Fetch the device's resource catalog.
    ///
    /// Must run before the reader starts: the handshake is the sole
    /// consumer of the inbound stream and matches replies by command, not
    /// by sequence slot.
    pub fn discover(&self) -> Result<ResourceCatalog> {
        let mut parked = self.reader_link.lock().map_err(|_| HalError::Lock)?;
        let link = parked
            .as_mut()
            .ok_or_else(|| HalError::Unknown("discovery after reader start".into()))?;
        discovery::discover(
            link.as_mut(),
            &self.tx,
            &self.rx_bytes,
            self.config.discovery_timeout,
        )
    }

    /// Issue one request and block for its response.
    ///
    /// On success the response overwrites `msg`. The sequence slot is
    /// released on every exit path; a response arriving after the deadline
    /// finds the slot vacant and is dropped by the reader.
    pub fn request(&self, msg: &mut Message) -> Result<()> {
        let (seq, gen, reply) = self.table.lock().map_err(|_| HalError::Lock)?.reserve()?;
        msg.seq = seq; // driver origin: bit 7 clear

        if let Err(e) = self.tx.send(msg) {
            self.release_slot(seq, gen);
            return Err(e);
        }

        let outcome = reply.recv_timeout(self.config.request_timeout);
        self.release_slot(seq, gen);
        match outcome {
            Ok(response) => {
                *msg = response;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(HalError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(HalError::Unknown("response channel disconnected".into()))
            }
        }
    }

    fn release_slot(&self, seq: u8, gen: u64) {
        if let Ok(mut table) = self.table.lock() {
            table.release(seq, gen);
        }
    }

    /// Start the reader thread. `trigger_names` maps event `rid`s to the
    /// names broadcast on the event socket.
    pub fn run_reader(&self, trigger_names: Vec<String>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HalError::Unknown("reader already running".into()));
        }

        let link = match self.reader_link.lock() {
            Ok(mut parked) => parked.take(),
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(HalError::Lock);
            }
        };
        let Some(link) = link else {
            self.running.store(false, Ordering::SeqCst);
            return Err(HalError::Unknown("reader was already stopped".into()));
        };

        let reader = Reader {
            link,
            tx: Arc::clone(&self.tx),
            table: Arc::clone(&self.table),
            events: Arc::clone(&self.events),
            running: Arc::clone(&self.running),
            rx_bytes: Arc::clone(&self.rx_bytes),
            trigger_names,
        };

        let handle = std::thread::Builder::new()
            .name("hal-reader".into())
            .spawn(move || reader.run())?;
        *self.reader.lock().map_err(|_| HalError::Lock)? = Some(handle);
        Ok(())
    }

    /// Stop and join the reader thread.
    pub fn stop_reader(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.reader.lock().map_err(|_| HalError::Lock)?.take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| HalError::Unknown("reader thread panicked".into()))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bytes received from the device, preamble and escapes included.
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    /// Bytes emitted to the device, preamble and escapes included.
    pub fn tx_bytes(&self) -> u64 {
        self.tx.tx_bytes()
    }

    /// Seconds since the connection was opened.
    pub fn uptime(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn sock_path(&self) -> &Path {
        &self.sock_path
    }

    /// Shut down: join the reader, close the port, unlink the socket.
    pub fn close(self) -> Result<()> {
        tracing::info!("closing HAL connection");
        self.stop_reader()
        // Drop closes the link halves and the event socket (which unlinks
        // its path).
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Best-effort: a still-running reader must not outlive the
        // connection it borrows from.
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                let _ = handle.join();
            }
        }
    }
}
