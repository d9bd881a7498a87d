//! # doomlink-core
//!
//! Shared library for the doomlink detached-UI link: the wire protocol, the
//! bounded buffers it is read from and written into, and the queue that
//! carries key events to the game.
//!
//! This crate has no dependencies on OS APIs or sockets.  The Unix transport,
//! shared-memory frames and session lifecycle live in `doomlink-host`.
//!
//! # Architecture overview
//!
//! A game process renders frames on a fixed tick and hands them to a separate
//! client process (the "detached UI"), which also draws menus, messages and
//! the status bar natively and sends input back.
//!
//! - **`buffer`** – A power-of-two [`RingBuffer`] with all-or-nothing reads,
//!   used for received bytes, and a [`SendBuffer`] that stages outbound
//!   messages and flushes them through a [`ByteSink`].
//!
//! - **`protocol`** – The tagged message catalog, encoders for host → client
//!   messages, and a [`Decoder`] for client → host messages that can stop in
//!   the middle of any message and resume when more bytes arrive.
//!
//! - **`input`** – The [`KeyQueue`] that buffers key events between ticks and
//!   translates them into [`InputEvent`]s.

pub mod buffer;
pub mod input;
pub mod protocol;

pub use buffer::{ByteSink, EncodeError, RingBuffer, RingError, SendBuffer, SinkError};
pub use input::{InputEvent, KeyQueue};
pub use protocol::codec::ServerMessage;
pub use protocol::decoder::{DecodeError, Decoder};
pub use protocol::messages::ClientMessage;
