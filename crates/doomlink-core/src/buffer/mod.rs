//! Bounded byte buffers used on both sides of the connection.

pub mod ring;
pub mod send;

pub use ring::{RingBuffer, RingError, RING_SIZE};
pub use send::{ByteSink, EncodeError, MessageWriter, SendBuffer, SinkError, MIN_SEND_CAPACITY};
