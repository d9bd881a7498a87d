//! Resumable decoder for client → host messages.
//!
//! The decoder pulls bytes out of a [`RingBuffer`] one field at a time.  When
//! a field is not fully buffered yet, the ring is left untouched and the
//! decoder remembers how far into the current message it got; the next call
//! continues from there once more bytes have been received.
//!
//! ```text
//! Idle ──tag──► PressKey { key: None } ──key──► PressKey { key: Some } ──pressed──► done
//!      ──tag──► SetFrameShmName(Length) ──len──► SetFrameShmName(Body) ──bytes──► done
//!      ──tag──► SetConfigVar(Name(..)) ──name──► SetConfigVar(Value { name, .. }) ──► done
//! ```

use thiserror::Error;
use tracing::debug;

use crate::buffer::ring::RingBuffer;
use crate::protocol::messages::{
    ClientMessage, ClientTag, MAX_CONFIG_NAME_LEN, MAX_CONFIG_VALUE_LEN, MAX_SHM_NAME_LEN,
};

/// Protocol violations.  Both are fatal to the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The tag byte does not name any client message.  Only the tag byte was
    /// consumed.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// A length prefix exceeds the bound for its field.
    #[error("{field} too long: {len} byte(s), maximum is {max}")]
    LengthExceeded {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Progress through a length-prefixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringStage {
    Length,
    Body { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigVarStage {
    Name(StringStage),
    Value { name: String, stage: StringStage },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum State {
    #[default]
    Idle,
    PressKey {
        key: Option<u8>,
    },
    SetFrameShmName(StringStage),
    SetConfigVar(ConfigVarStage),
}

enum Step {
    /// Not enough bytes buffered; resume from this state later.
    Short(State),
    /// Made progress; keep going from this state.
    Advance(State),
    Done(ClientMessage),
}

enum Field<T> {
    Ready(T),
    Short(StringStage),
}

/// Resumable client message decoder.
#[derive(Debug, Default)]
pub struct Decoder {
    state: State,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a message has been started but not completed.
    pub fn in_progress(&self) -> bool {
        self.state != State::Idle
    }

    /// Decodes at most one message from `ring`.
    ///
    /// Returns `Ok(None)` when the buffered bytes end before the next message
    /// is complete.  Progress made so far is kept and nothing is lost; call
    /// again after more bytes arrive.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] on an unknown tag or an oversized length
    /// field.  The connection must be dropped afterwards.
    pub fn poll<const N: usize>(
        &mut self,
        ring: &mut RingBuffer<N>,
    ) -> Result<Option<ClientMessage>, DecodeError> {
        loop {
            let state = std::mem::take(&mut self.state);
            match step(state, ring)? {
                Step::Short(state) => {
                    self.state = state;
                    return Ok(None);
                }
                Step::Advance(state) => self.state = state,
                Step::Done(msg) => return Ok(Some(msg)),
            }
        }
    }

    /// Decodes every complete message in `ring`, handing each to `on_message`.
    ///
    /// Returns the number of messages handled.
    ///
    /// # Errors
    ///
    /// Stops at the first decode error or the first error returned by
    /// `on_message`.
    pub fn drain<const N: usize, E, F>(
        &mut self,
        ring: &mut RingBuffer<N>,
        mut on_message: F,
    ) -> Result<usize, E>
    where
        E: From<DecodeError>,
        F: FnMut(ClientMessage) -> Result<(), E>,
    {
        let mut handled = 0;
        while let Some(msg) = self.poll(ring)? {
            on_message(msg)?;
            handled += 1;
        }
        Ok(handled)
    }
}

fn step<const N: usize>(state: State, ring: &mut RingBuffer<N>) -> Result<Step, DecodeError> {
    match state {
        State::Idle => {
            let Some(raw) = ring.read_u8() else {
                return Ok(Step::Short(State::Idle));
            };
            let next = match ClientTag::try_from(raw).map_err(DecodeError::UnknownMessageType)? {
                ClientTag::WantFrame => return Ok(Step::Done(ClientMessage::WantFrame)),
                ClientTag::PressKey => State::PressKey { key: None },
                ClientTag::SetFrameShmName => State::SetFrameShmName(StringStage::Length),
                ClientTag::SetConfigVar => State::SetConfigVar(ConfigVarStage::Name(StringStage::Length)),
            };
            Ok(Step::Advance(next))
        }

        State::PressKey { key: None } => Ok(match ring.read_u8() {
            Some(key) => Step::Advance(State::PressKey { key: Some(key) }),
            None => Step::Short(state),
        }),

        State::PressKey { key: Some(key) } => Ok(match ring.read_u8() {
            Some(pressed) => Step::Done(ClientMessage::PressKey { key, pressed }),
            None => Step::Short(state),
        }),

        State::SetFrameShmName(stage) => {
            Ok(match read_raw(ring, stage, "frame shm name", MAX_SHM_NAME_LEN)? {
                Field::Ready(name) => Step::Done(ClientMessage::SetFrameShmName { name }),
                Field::Short(stage) => Step::Short(State::SetFrameShmName(stage)),
            })
        }

        State::SetConfigVar(ConfigVarStage::Name(stage)) => {
            Ok(match read_raw(ring, stage, "config variable name", MAX_CONFIG_NAME_LEN)? {
                Field::Ready(raw) => Step::Advance(State::SetConfigVar(ConfigVarStage::Value {
                    name: into_string(raw, "config variable name"),
                    stage: StringStage::Length,
                })),
                Field::Short(stage) => Step::Short(State::SetConfigVar(ConfigVarStage::Name(stage))),
            })
        }

        State::SetConfigVar(ConfigVarStage::Value { name, stage }) => {
            Ok(match read_raw(ring, stage, "config variable value", MAX_CONFIG_VALUE_LEN)? {
                Field::Ready(raw) => Step::Done(ClientMessage::SetConfigVar {
                    name,
                    value: into_string(raw, "config variable value"),
                }),
                Field::Short(stage) => {
                    Step::Short(State::SetConfigVar(ConfigVarStage::Value { name, stage }))
                }
            })
        }
    }
}

/// Advances through a length-prefixed string as far as the buffered bytes
/// allow.  The length is checked against `max` as soon as it is read.
fn read_raw<const N: usize>(
    ring: &mut RingBuffer<N>,
    mut stage: StringStage,
    field: &'static str,
    max: usize,
) -> Result<Field<Vec<u8>>, DecodeError> {
    loop {
        match stage {
            StringStage::Length => {
                let Some(len) = ring.read_u16() else {
                    return Ok(Field::Short(stage));
                };
                let len = usize::from(len);
                if len > max {
                    return Err(DecodeError::LengthExceeded { field, len, max });
                }
                stage = StringStage::Body { len };
            }
            StringStage::Body { len } => {
                if ring.len() < len {
                    return Ok(Field::Short(stage));
                }
                let mut raw = vec![0u8; len];
                ring.read_bytes(&mut raw);
                return Ok(Field::Ready(raw));
            }
        }
    }
}

/// Config names and values are text; invalid bytes are replaced.
fn into_string(raw: Vec<u8>, field: &'static str) -> String {
    match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => {
            debug!("{field} is not valid UTF-8, replacing invalid bytes");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
