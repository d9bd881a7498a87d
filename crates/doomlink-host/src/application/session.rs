//! The connected session: all per-connection state and the operations the
//! game loop calls on it.
//!
//! A `Session` owns the socket, both buffers, the decoder, the key queue and
//! the frame channel.  Everything is driven from the tick loop through
//! `&mut Session`; there are no threads and no locks.
//!
//! # Per-tick flow
//!
//! ```text
//! send_player_status (if changed) → flush → pump_input → next_input* → game tick
//!                                                                     └─ send_frame / send_* (buffered)
//! ```

use std::time::Instant;

use doomlink_core::buffer::{EncodeError, RingBuffer, SendBuffer, SinkError};
use doomlink_core::protocol::messages::{
    DetachedUi, FinaleStage, Init, IntermissionSnapshot, MenuSnapshot, PlayerStatus,
};
use doomlink_core::protocol::{encode_init, encode_server_message, ClientMessage, DecodeError, Decoder, ServerMessage};
use doomlink_core::{InputEvent, KeyQueue};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::frame::{FrameChannel, FramePath};
use crate::application::host::ConfigSink;
use crate::config::HostConfig;
use crate::infrastructure::shm::ShmError;
use crate::infrastructure::signal::CancelToken;
use crate::infrastructure::transport::{Connection, TransportError};

/// Anything that ends a session.
///
/// Every variant except [`SessionError::Cancelled`] is fatal: the session
/// must be shut down and not used again.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Cancellation was requested (SIGINT/SIGTERM).  Not a failure.
    #[error("session cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(TransportError),

    #[error("communications connection was closed: {0}")]
    Send(SinkError),

    #[error("protocol violation: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode message: {0}")]
    Encode(EncodeError),

    #[error(transparent)]
    Shm(ShmError),

    /// The receive buffer filled up without yielding a complete message.
    #[error("communications read buffer overflow")]
    ReceiveOverflow,

    /// A frame buffer of the wrong length was handed to `send_frame`.
    #[error("frame must be {expected} byte(s), got {actual}")]
    FrameSize { expected: usize, actual: usize },
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => SessionError::Cancelled,
            other => SessionError::Transport(other),
        }
    }
}

impl From<SinkError> for SessionError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Cancelled => SessionError::Cancelled,
            other => SessionError::Send(other),
        }
    }
}

impl From<EncodeError> for SessionError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Sink(sink) => sink.into(),
            other => SessionError::Encode(other),
        }
    }
}

impl From<ShmError> for SessionError {
    fn from(e: ShmError) -> Self {
        match e {
            ShmError::Cancelled => SessionError::Cancelled,
            other => SessionError::Shm(other),
        }
    }
}

/// Sizing for a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    pub width: u16,
    pub height: u16,
    /// Send buffer size in bytes.
    pub send_capacity: usize,
}

impl From<&HostConfig> for SessionParams {
    fn from(config: &HostConfig) -> Self {
        Self {
            width: config.screen_width,
            height: config.screen_height,
            send_capacity: config.send_capacity(),
        }
    }
}

/// One connected client.
pub struct Session {
    conn: Connection,
    recv: RingBuffer,
    decoder: Decoder,
    keys: KeyQueue,
    send: SendBuffer,
    frames: FrameChannel,
    last_status: Option<PlayerStatus>,
    cancel: CancelToken,
    started: Instant,
}

impl Session {
    /// Wraps a freshly accepted connection and queues the `Init` handshake.
    ///
    /// # Errors
    ///
    /// Fails only if the handshake cannot be buffered.
    pub fn new(
        conn: Connection,
        params: SessionParams,
        cancel: CancelToken,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            conn,
            recv: RingBuffer::new(),
            decoder: Decoder::new(),
            keys: KeyQueue::new(),
            send: SendBuffer::with_capacity(params.send_capacity.max(64)),
            frames: FrameChannel::new(params.width, params.height),
            last_status: None,
            cancel,
            started: Instant::now(),
        };
        let init = Init {
            width: params.width,
            height: params.height,
        };
        encode_init(&mut session.send, &mut session.conn, init)?;
        debug!(width = init.width, height = init.height, "handshake queued");
        Ok(session)
    }

    /// Milliseconds since the client connected.
    pub fn ticks_ms(&self) -> u32 {
        // Wraps after ~49 days, like any 32-bit millisecond clock.
        self.started.elapsed().as_millis() as u32
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    // ── Receive side ──────────────────────────────────────────────────────────

    /// Reads everything the client has sent so far and applies every complete
    /// message.  Never blocks.
    ///
    /// Returns the number of messages applied.
    ///
    /// # Errors
    ///
    /// Fails on EOF, receive errors, protocol violations, or when the receive
    /// buffer fills without a message completing.
    pub fn pump_input<C: ConfigSink + ?Sized>(
        &mut self,
        config: &mut C,
    ) -> Result<usize, SessionError> {
        let mut applied = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let received = self.conn.recv_into(&mut self.recv)?;
            if received == 0 {
                return Ok(applied);
            }

            let keys = &mut self.keys;
            let frames = &mut self.frames;
            applied += self.decoder.drain(&mut self.recv, |msg| {
                apply_message(msg, keys, frames, &mut *config);
                Ok::<_, SessionError>(())
            })?;

            if self.recv.is_empty() {
                self.recv.reset_if_empty();
            } else if self.recv.is_full() {
                return Err(SessionError::ReceiveOverflow);
            }
        }
    }

    /// Next queued input event, oldest first.
    pub fn next_input(&mut self) -> Option<InputEvent> {
        self.keys.pop()
    }

    /// Whether the client asked for a frame since the last one was sent.
    pub fn wants_frame(&self) -> bool {
        self.frames.wants_frame()
    }

    pub fn frame_path(&self) -> FramePath {
        self.frames.path()
    }

    pub fn frame_size(&self) -> usize {
        self.frames.frame_size()
    }

    // ── Send side ─────────────────────────────────────────────────────────────

    /// Sends everything buffered.  Blocks until the peer has taken it all.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        self.send.flush(&mut self.conn)?;
        Ok(())
    }

    /// Flushes and then drains input.  For loops that run outside the normal
    /// tick, such as screen wipes.
    pub fn service<C: ConfigSink + ?Sized>(&mut self, config: &mut C) -> Result<usize, SessionError> {
        self.flush()?;
        self.pump_input(config)
    }

    /// Delivers one frame through the active frame path.
    pub fn send_frame(&mut self, pixels: &[u8]) -> Result<(), SessionError> {
        self.frames
            .send_frame(pixels, &mut self.send, &mut self.conn, &self.cancel)
    }

    /// Flags a UI element for the client to draw over the next frame.
    pub fn mark_detached_ui(&mut self, ui: DetachedUi) {
        self.frames.mark_detached_ui(ui);
    }

    /// Sends `status` unless it equals the last status sent.
    ///
    /// Returns whether a message was queued.
    pub fn send_player_status(&mut self, status: &PlayerStatus) -> Result<bool, SessionError> {
        if self.last_status.as_ref() == Some(status) {
            return Ok(false);
        }
        self.send_message(&ServerMessage::PlayerStatus(status))?;
        self.last_status = Some(*status);
        Ok(true)
    }

    pub fn send_title(&mut self, title: &str) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::SetTitle(title))
    }

    /// Sends a HUD message; `prefix` (e.g. a player name) and `body` travel
    /// as a single string.
    pub fn send_game_message(&mut self, prefix: &str, body: &str) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::GameMessage { prefix, body })
    }

    pub fn send_menu_message(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::MenuMessage(text))
    }

    pub fn send_automap_title(&mut self, title: &str) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::AutomapTitle(title))
    }

    pub fn send_menu(&mut self, menu: &MenuSnapshot) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::Menu(menu))
    }

    pub fn send_intermission(&mut self, snapshot: &IntermissionSnapshot) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::Intermission(snapshot))
    }

    pub fn send_finale_text(&mut self, stage: FinaleStage, text: &str) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::FinaleText { stage, text })
    }

    /// Number of finale characters revealed so far.
    pub fn send_finale_text_length(&mut self, count: u16) -> Result<(), SessionError> {
        self.send_message(&ServerMessage::FinaleTextLength(count))
    }

    fn send_message(&mut self, msg: &ServerMessage<'_>) -> Result<(), SessionError> {
        encode_server_message(&mut self.send, &mut self.conn, msg)?;
        Ok(())
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Ends the session: best-effort `Quit`, non-blocking flush, close the
    /// socket, unlink any shared-memory object.  Never fails; problems are
    /// logged.
    pub fn shutdown(mut self) {
        if self.send.has_partial_message() {
            debug!("partial message buffered; not sending quit");
        } else {
            let mut sink = self.conn.best_effort();
            if let Err(e) = encode_server_message(&mut self.send, &mut sink, &ServerMessage::Quit) {
                warn!("failed to queue quit message: {e}");
            }
        }
        if let Err(e) = self.send.flush(&mut self.conn.best_effort()) {
            warn!("failed to flush communications socket during shutdown: {e}");
        }
        self.conn.close();
        self.frames.release();
        info!("session closed");
    }
}

/// Applies the side effect of one decoded message.
fn apply_message<C: ConfigSink + ?Sized>(
    msg: ClientMessage,
    keys: &mut KeyQueue,
    frames: &mut FrameChannel,
    config: &mut C,
) {
    match msg {
        ClientMessage::WantFrame => frames.request_frame(),
        ClientMessage::PressKey { key, pressed } => {
            keys.push(key, pressed);
        }
        ClientMessage::SetFrameShmName { name } => frames.set_shm_target(name),
        ClientMessage::SetConfigVar { name, value } => {
            info!(name = %name, value = %value, "config variable requested");
            if !config.set_variable(&name, &value) {
                warn!("failed to set config variable {name:?}; maybe it isn't bound");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
