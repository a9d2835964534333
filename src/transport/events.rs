//! Event fan-out over a Unix stream socket.
//!
//! Trigger state changes are broadcast as text lines to every connected
//! listener. Delivery is best-effort: a listener that fails a send is
//! closed and evicted on the spot, and sends carry MSG_NOSIGNAL so a dead
//! peer cannot raise SIGPIPE against the engine.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Fixed cap on simultaneous listeners.
pub const MAX_CLIENTS: usize = 42;

/// Listening socket plus the connected-client array.
pub struct EventSocket {
    listener: UnixListener,
    clients: Vec<UnixStream>,
    path: PathBuf,
}

impl EventSocket {
    /// Bind the socket at `path`, replacing any stale file, and open it
    /// up to every local user (the consumers are arbitrary shell scripts
    /// and user programs).
    pub fn open(path: &Path) -> Result<Self> {
        let _ = fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;

        tracing::debug!(path = %path.display(), "event socket bound");
        Ok(Self {
            listener,
            clients: Vec::with_capacity(MAX_CLIENTS),
            path: path.to_path_buf(),
        })
    }

    /// Accept every connection currently pending. Connections past the
    /// client cap are dropped immediately.
    pub fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if self.clients.len() >= MAX_CLIENTS {
                        tracing::warn!("event listener cap reached, dropping new client");
                        continue;
                    }
                    tracing::debug!(clients = self.clients.len() + 1, "event listener connected");
                    self.clients.push(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!("event socket accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Send `line` to every listener, evicting any that fail.
    pub fn broadcast(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < self.clients.len() {
            if send_nosignal(&self.clients[i], bytes) {
                i += 1;
            } else {
                tracing::debug!("evicting dead event listener");
                drop(self.clients.swap_remove(i));
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Drop for EventSocket {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// send(2) with MSG_NOSIGNAL; true only if the whole buffer went out.
fn send_nosignal(stream: &UnixStream, buf: &[u8]) -> bool {
    let sent = unsafe {
        libc::send(
            stream.as_raw_fd(),
            buf.as_ptr().cast(),
            buf.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    sent == buf.len() as isize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_bind_accept_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.sock");
        let mut sock = EventSocket::open(&path).unwrap();
        assert!(path.exists());

        let mut a = UnixStream::connect(&path).unwrap();
        let mut b = UnixStream::connect(&path).unwrap();
        sock.accept_pending();
        assert_eq!(sock.client_count(), 2);

        sock.broadcast("button:1\n");

        let mut buf = [0u8; 16];
        let n = a.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"button:1\n");
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"button:1\n");
    }

    #[test]
    fn test_dead_listener_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.sock");
        let mut sock = EventSocket::open(&path).unwrap();

        let dead = UnixStream::connect(&path).unwrap();
        let mut live = UnixStream::connect(&path).unwrap();
        sock.accept_pending();
        assert_eq!(sock.client_count(), 2);

        drop(dead);
        // send(2) to a closed AF_UNIX peer fails synchronously.
        sock.broadcast("motion:1\n");
        assert_eq!(sock.client_count(), 1);

        let mut buf = [0u8; 32];
        let n = live.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"motion:1\n");
    }

    #[test]
    fn test_stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.sock");

        let first = EventSocket::open(&path).unwrap();
        drop(first);
        assert!(!path.exists());

        let second = EventSocket::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(second.path(), path.as_path());
    }

    #[test]
    fn test_socket_mode_is_world_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hal.sock");
        let _sock = EventSocket::open(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
