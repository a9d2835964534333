//! Test harness: an in-memory duplex link standing in for the serial
//! port, plus a scripted device end that speaks real frames.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use hal_link::protocol::{encode_frame, Command, FrameParser, Message, DEVICE_ORIGIN};
use hal_link::transport::Link;
use hal_link::{Connection, HalConfig};

/// One direction of the duplex: a byte queue with a condvar so reads can
/// block briefly, the way a serial port read with a timeout does.
struct Pipe {
    queue: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        })
    }

    fn push(&self, bytes: &[u8]) {
        let mut queue = self.queue.lock().unwrap();
        queue.extend(bytes);
        self.ready.notify_all();
    }

    fn pop_into(&self, buf: &mut [u8], wait: Duration) -> usize {
        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            let (guard, _) = self.ready.wait_timeout(queue, wait).unwrap();
            queue = guard;
        }
        let n = buf.len().min(queue.len());
        for slot in buf[..n].iter_mut() {
            *slot = queue.pop_front().unwrap();
        }
        n
    }
}

/// Host-side transport handed to `Connection::over`.
pub struct TestLink {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

impl Read for TestLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.pop_into(buf, Duration::from_millis(5)) {
            0 => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            n => Ok(n),
        }
    }
}

impl Write for TestLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for TestLink {
    fn try_clone_link(&self) -> io::Result<Box<dyn Link>> {
        Ok(Box::new(TestLink {
            rx: Arc::clone(&self.rx),
            tx: Arc::clone(&self.tx),
        }))
    }
}

/// The far end of the link: reads the host's frames, injects the
/// device's.
pub struct DeviceEnd {
    from_host: Arc<Pipe>,
    to_host: Arc<Pipe>,
    parser: FrameParser,
}

impl DeviceEnd {
    /// Emit a frame toward the host.
    pub fn send(&self, msg: &Message) {
        self.to_host.push(&encode_frame(msg));
    }

    /// Emit raw bytes toward the host (for deliberately damaged frames).
    pub fn send_raw(&self, bytes: &[u8]) {
        self.to_host.push(bytes);
    }

    /// Pull the next frame the host emitted, or None at the deadline.
    pub fn recv(&mut self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            let n = self.from_host.pop_into(&mut buf, Duration::from_millis(5));
            for &byte in &buf[..n] {
                if let Ok(Some(msg)) = self.parser.feed(byte) {
                    return Some(msg);
                }
            }
            if n == 0 && Instant::now() >= deadline {
                return None;
            }
        }
    }
}

pub fn link_pair() -> (TestLink, DeviceEnd) {
    let host_to_device = Pipe::new();
    let device_to_host = Pipe::new();
    (
        TestLink {
            rx: Arc::clone(&device_to_host),
            tx: Arc::clone(&host_to_device),
        },
        DeviceEnd {
            from_host: host_to_device,
            to_host: device_to_host,
            parser: FrameParser::new(),
        },
    )
}

/// A connection over a fresh duplex, with its event socket in a tempdir.
pub fn engine(config: HalConfig) -> (Connection, DeviceEnd, tempfile::TempDir) {
    let (link, device) = link_pair();
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = Connection::over(link, &dir.path().join("hal-events.sock"), config)
        .expect("connection over test link");
    (conn, device, dir)
}

/// A device-originated frame (events, async notifications).
pub fn device_frame(cmd: Command, change: bool, rid: u8, data: Vec<u8>) -> Message {
    let mut msg = if change {
        Message::change(cmd, rid, data)
    } else {
        let mut m = Message::ask(cmd, rid);
        m.data = data;
        m
    };
    msg.seq = DEVICE_ORIGIN | 0x01;
    msg
}

/// The device's reply to a request: same sequence tag, caller-chosen
/// payload.
pub fn reply_to(request: &Message, data: Vec<u8>) -> Message {
    Message {
        seq: request.seq,
        cmd: request.cmd,
        rid: request.rid,
        data,
    }
}
