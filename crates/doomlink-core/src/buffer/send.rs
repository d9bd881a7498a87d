//! Bounded outbound staging buffer.
//!
//! Outbound messages are encoded straight into a fixed-size byte array and
//! handed to a [`ByteSink`] (the socket transport) whenever the array would
//! overflow, or when the caller flushes explicitly at the end of a tick.
//!
//! Encoding happens through a [`MessageWriter`] obtained from
//! [`SendBuffer::begin`].  Only one writer can exist at a time; a writer that
//! is dropped without [`MessageWriter::finish`] (because an encoder failed
//! half-way) leaves the buffer marked as holding a partial message, which
//! shutdown uses to avoid appending a `Quit` after garbage.

use thiserror::Error;

/// Failure reported by a [`ByteSink`] while pushing bytes to the peer.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The cancellation token was observed while retrying an interrupted send.
    #[error("interrupted by cancellation request")]
    Cancelled,

    /// The peer closed or reset the connection.
    #[error("connection was closed by the peer: {0}")]
    Closed(#[source] std::io::Error),

    /// Any other send failure.
    #[error("failed to send {len} byte(s): {source}")]
    Io {
        len: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while encoding an outbound message.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Strings are length-prefixed with a `u16` and cannot exceed 65535 bytes.
    #[error("string of length {0} byte(s) too large for sending")]
    StringTooLong(usize),

    /// [`SendBuffer::begin`] was called while another message was unfinished.
    #[error("another outbound message is still being written")]
    MessageInProgress,

    /// The message cannot be represented on the wire.
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),

    /// Flushing the buffer to the peer failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Destination for flushed bytes.
///
/// Implementations must either send every byte or fail; partial success is
/// handled internally (retrying short writes).
pub trait ByteSink {
    /// Sends all of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] describing why the bytes could not be sent.
    fn send_all(&mut self, bytes: &[u8]) -> Result<(), SinkError>;
}

impl ByteSink for Vec<u8> {
    fn send_all(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Smallest send buffer: room for one `u32`.
pub const MIN_SEND_CAPACITY: usize = 4;

/// Fixed-capacity outbound buffer.
pub struct SendBuffer {
    data: Box<[u8]>,
    len: usize,
    writing: bool,
}

impl SendBuffer {
    /// Creates a buffer holding at most `capacity` bytes between flushes.
    ///
    /// Capacities below [`MIN_SEND_CAPACITY`] are raised to it so every
    /// fixed-size encoder fits.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_SEND_CAPACITY);
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            writing: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes waiting to be flushed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a message was started and never finished.
    pub fn has_partial_message(&self) -> bool {
        self.writing
    }

    /// Bytes waiting to be flushed.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Starts encoding a new outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::MessageInProgress`] if a previous writer was
    /// dropped without calling [`MessageWriter::finish`].
    pub fn begin<'a, S: ByteSink + ?Sized>(
        &'a mut self,
        sink: &'a mut S,
    ) -> Result<MessageWriter<'a, S>, EncodeError> {
        if self.writing {
            return Err(EncodeError::MessageInProgress);
        }
        self.writing = true;
        Ok(MessageWriter { buf: self, sink })
    }

    /// Sends everything buffered so far and empties the buffer.
    ///
    /// # Errors
    ///
    /// Propagates the sink's error; the buffered bytes are kept in that case.
    pub fn flush<S: ByteSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), SinkError> {
        if self.len == 0 {
            return Ok(());
        }
        sink.send_all(&self.data[..self.len])?;
        self.len = 0;
        Ok(())
    }

    fn push(&mut self, bytes: &[u8]) {
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }
}

impl std::fmt::Debug for SendBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendBuffer")
            .field("capacity", &self.data.len())
            .field("len", &self.len)
            .field("writing", &self.writing)
            .finish()
    }
}

/// Encoder handle for exactly one outbound message.
pub struct MessageWriter<'a, S: ByteSink + ?Sized> {
    buf: &'a mut SendBuffer,
    sink: &'a mut S,
}

impl<'a, S: ByteSink + ?Sized> MessageWriter<'a, S> {
    /// Appends a fixed-size value, flushing first if it would not fit.
    fn write_atomic(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if self.buf.len + bytes.len() > self.buf.capacity() {
            self.buf.flush(&mut *self.sink)?;
        }
        self.buf.push(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), EncodeError> {
        self.write_atomic(&[v])
    }

    pub fn write_i8(&mut self, v: i8) -> Result<(), EncodeError> {
        self.write_atomic(&v.to_le_bytes())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), EncodeError> {
        self.write_atomic(&v.to_le_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<(), EncodeError> {
        self.write_atomic(&v.to_le_bytes())
    }

    /// Writes the low 24 bits of `v`, little-endian.
    pub fn write_u24(&mut self, v: u32) -> Result<(), EncodeError> {
        let b = v.to_le_bytes();
        self.write_atomic(&b[..3])
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), EncodeError> {
        self.write_atomic(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), EncodeError> {
        self.write_atomic(&v.to_le_bytes())
    }

    /// Appends raw bytes, flushing as many times as needed.
    ///
    /// Unlike the fixed-size encoders, a bulk payload may span flushes.
    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<(), EncodeError> {
        loop {
            let room = self.buf.capacity() - self.buf.len;
            let take = bytes.len().min(room);
            self.buf.push(&bytes[..take]);
            bytes = &bytes[take..];
            if bytes.is_empty() {
                return Ok(());
            }
            // Buffer is full at this point.
            self.buf.flush(&mut *self.sink)?;
        }
    }

    /// Writes a `u16` length prefix followed by the raw bytes of `s`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::StringTooLong`] above 65535 bytes; nothing is
    /// written in that case.
    pub fn write_string(&mut self, s: &str) -> Result<(), EncodeError> {
        self.write_length_prefixed(&[s.as_bytes()])
    }

    /// Writes several byte runs under a single `u16` length prefix.
    pub fn write_length_prefixed(&mut self, parts: &[&[u8]]) -> Result<(), EncodeError> {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let len = u16::try_from(total).map_err(|_| EncodeError::StringTooLong(total))?;
        self.write_u16(len)?;
        for part in parts {
            self.write_bytes(part)?;
        }
        Ok(())
    }

    /// Marks the message as complete and releases the buffer.
    pub fn finish(self) {
        self.buf.writing = false;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
