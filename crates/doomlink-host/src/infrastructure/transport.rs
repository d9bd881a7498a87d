//! Unix-domain socket transport.
//!
//! One listener, one accepted client, then the listener is gone:
//!
//! ```text
//! Listener::bind(path) ──accept──► Connection ──close──►
//!        └── closed + path unlinked right after accept (or on drop)
//! ```
//!
//! Receives never block: they copy whatever is available into the session's
//! [`RingBuffer`].  Sends block until every byte is written, retrying
//! interrupted calls unless cancellation was requested.

use std::io::{self, ErrorKind};
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use doomlink_core::buffer::{ByteSink, RingBuffer, SinkError};
use nix::errno::Errno;
use nix::sys::socket::{self, MsgFlags, UnixAddr};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::signal::CancelToken;

/// Errors raised by the socket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket path does not fit in `sockaddr_un`.
    #[error("listener socket path too long: {path} ({len} byte(s))")]
    PathTooLong { path: PathBuf, len: usize },

    /// `bind`/`listen` on the socket path failed.
    #[error("failed to bind listener socket to {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A non-transient `accept` failure.
    #[error("unexpected error while listening for connections: {0}")]
    Accept(#[source] io::Error),

    /// Cancellation was requested while waiting in a syscall loop.
    #[error("interrupted by cancellation request")]
    Cancelled,

    /// The peer closed its end of the connection.
    #[error("EOF while reading from communications socket")]
    PeerClosed,

    /// Receiving failed for a reason other than "no data yet".
    #[error("unexpected error while reading from communications socket: {0}")]
    Recv(#[source] io::Error),

    /// Socket options could not be applied.
    #[error("failed to configure socket: {0}")]
    Configure(#[source] io::Error),
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Listening socket bound to a filesystem path.
///
/// Dropping the listener closes it and unlinks the path.
#[derive(Debug)]
pub struct Listener {
    socket: Option<UnixListener>,
    path: PathBuf,
}

impl Listener {
    /// Binds and listens on `path`.
    ///
    /// An existing file at `path` is not removed; binding then fails.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PathTooLong`] or [`TransportError::Bind`].
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        if let Err(Errno::ENAMETOOLONG) = UnixAddr::new(path.as_path()) {
            let len = path.as_os_str().len();
            return Err(TransportError::PathTooLong { path, len });
        }

        let socket = UnixListener::bind(&path).map_err(|source| TransportError::Bind {
            path: path.clone(),
            source,
        })?;
        // The path now belongs to us; from here on drop unlinks it.
        let listener = Self {
            socket: Some(socket),
            path,
        };
        if let Some(socket) = &listener.socket {
            socket
                .set_nonblocking(true)
                .map_err(TransportError::Configure)?;
        }

        info!(path = %listener.path.display(), "listening for connections");
        Ok(listener)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for exactly one client, then closes the listener.
    ///
    /// The listener is polled every `poll_interval` so that `cancel` is
    /// noticed promptly.  Aborted connections and permission failures are
    /// logged and waited past.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] when `cancel` is set, or
    /// [`TransportError::Accept`] for any other accept failure.
    pub fn accept(
        mut self,
        cancel: &CancelToken,
        poll_interval: Duration,
    ) -> Result<Connection, TransportError> {
        let stream = {
            let Some(socket) = &self.socket else {
                return Err(TransportError::Accept(io::Error::from(ErrorKind::NotConnected)));
            };
            loop {
                if cancel.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }
                match socket.accept() {
                    Ok((stream, _)) => break stream,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(poll_interval),
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!("failed to accept a connection: {e}");
                    }
                    Err(e) => return Err(TransportError::Accept(e)),
                }
            }
        };

        stream
            .set_nonblocking(false)
            .map_err(TransportError::Configure)?;
        let connection = Connection::new(stream, cancel.clone());
        match connection.peer_pid() {
            Some(pid) => info!(pid, "client has connected"),
            None => info!("a client has connected"),
        }

        self.close();
        Ok(connection)
    }

    /// Closes the socket and unlinks its path.  Idempotent.
    pub fn close(&mut self) {
        if self.socket.take().is_none() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "failed to delete listener socket file: {e}");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error().map(Errno::from_raw),
        Some(Errno::ECONNABORTED | Errno::EPERM)
    )
}

// ── Connection ────────────────────────────────────────────────────────────────

/// The single connected client.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    cancel: CancelToken,
}

impl Connection {
    /// Wraps an already-connected, blocking stream.
    pub fn new(stream: UnixStream, cancel: CancelToken) -> Self {
        Self { stream, cancel }
    }

    /// PID of the connected process, where the platform reports it.
    pub fn peer_pid(&self) -> Option<i32> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            socket::getsockopt(&self.stream, socket::sockopt::PeerCredentials)
                .ok()
                .map(|creds| creds.pid())
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            None
        }
    }

    /// Copies everything currently readable into `ring` without blocking.
    ///
    /// Returns the number of bytes received, `0` meaning nothing was
    /// available.  Stops early when `ring` is full.  EOF after some bytes
    /// were read returns those bytes; the next call reports the EOF.
    ///
    /// # Errors
    ///
    /// [`TransportError::PeerClosed`] on EOF with nothing received,
    /// [`TransportError::Cancelled`] if interrupted after cancellation,
    /// [`TransportError::Recv`] otherwise.
    pub fn recv_into<const N: usize>(
        &mut self,
        ring: &mut RingBuffer<N>,
    ) -> Result<usize, TransportError> {
        let mut total = 0;
        loop {
            let region = ring.free_region_mut();
            if region.is_empty() {
                return Ok(total);
            }
            match socket::recv(self.stream.as_raw_fd(), region, MsgFlags::MSG_DONTWAIT) {
                Ok(0) if total == 0 => return Err(TransportError::PeerClosed),
                Ok(0) => return Ok(total),
                Ok(n) => {
                    ring.commit(n);
                    total += n;
                }
                Err(Errno::EAGAIN) => return Ok(total),
                Err(Errno::EINTR) => {
                    if self.cancel.is_cancelled() {
                        return Err(TransportError::Cancelled);
                    }
                }
                Err(e) => return Err(TransportError::Recv(e.into())),
            }
        }
    }

    /// A sink that never blocks and gives up on the first failure.  Used
    /// while shutting down.
    pub fn best_effort(&mut self) -> BestEffortSink<'_> {
        BestEffortSink { conn: self }
    }

    /// Closes the socket, logging a failure instead of returning it.
    pub fn close(self) {
        let fd = self.stream.into_raw_fd();
        if let Err(e) = nix::unistd::close(fd) {
            warn!("failed to close communications socket: {e}");
        } else {
            debug!("communications socket closed");
        }
    }

    fn send_loop(&mut self, bytes: &[u8], flags: MsgFlags) -> Result<(), SinkError> {
        let mut sent = 0;
        while sent < bytes.len() {
            match socket::send(self.stream.as_raw_fd(), &bytes[sent..], flags) {
                Ok(0) => {
                    return Err(SinkError::Closed(io::Error::from(ErrorKind::WriteZero)));
                }
                Ok(n) => sent += n,
                Err(Errno::EINTR) => {
                    if self.cancel.is_cancelled() {
                        return Err(SinkError::Cancelled);
                    }
                }
                Err(e @ (Errno::ECONNRESET | Errno::EPIPE)) => {
                    return Err(SinkError::Closed(e.into()));
                }
                Err(e) => {
                    return Err(SinkError::Io {
                        len: bytes.len() - sent,
                        source: e.into(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl ByteSink for Connection {
    fn send_all(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.send_loop(bytes, send_flags())
    }
}

/// Non-blocking view of a [`Connection`] for the shutdown flush.
pub struct BestEffortSink<'a> {
    conn: &'a mut Connection,
}

impl ByteSink for BestEffortSink<'_> {
    fn send_all(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.conn
            .send_loop(bytes, send_flags() | MsgFlags::MSG_DONTWAIT)
    }
}

/// Suppresses SIGPIPE where the platform supports it per call.
fn send_flags() -> MsgFlags {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        MsgFlags::MSG_NOSIGNAL
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        MsgFlags::empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
