//! Encoders for the detached-UI wire format.
//!
//! Host → client messages are written straight into a [`SendBuffer`] through
//! a [`MessageWriter`], so a frame never needs an intermediate allocation.
//! Client → host messages are encoded into a `Vec<u8>`; the host never sends
//! them, but clients, tests and benches do.
//!
//! Wire format of a string:
//! ```text
//! [len:u16 LE][bytes:len]
//! ```

use crate::buffer::send::{ByteSink, EncodeError, MessageWriter, SendBuffer};
use crate::protocol::messages::{
    ClientMessage, DetachedUi, FinaleStage, Init, IntermissionSnapshot,
    IntermissionState, MenuSnapshot, MenuTrailer, PlayerStatus, ServerTag,
};

/// A host → client message borrowing its payload from the caller.
#[derive(Debug, Clone, Copy)]
pub enum ServerMessage<'a> {
    Frame {
        pixels: &'a [u8],
        detached_ui: DetachedUi,
    },
    SetTitle(&'a str),
    Quit,
    FrameShmReady,
    /// Sent as one string: `prefix` immediately followed by `body`.
    GameMessage {
        prefix: &'a str,
        body: &'a str,
    },
    PlayerStatus(&'a PlayerStatus),
    MenuMessage(&'a str),
    AutomapTitle(&'a str),
    Menu(&'a MenuSnapshot),
    Intermission(&'a IntermissionSnapshot),
    FinaleText {
        stage: FinaleStage,
        text: &'a str,
    },
    FinaleTextLength(u16),
}

impl ServerMessage<'_> {
    pub fn tag(&self) -> ServerTag {
        match self {
            ServerMessage::Frame { .. } => ServerTag::Frame,
            ServerMessage::SetTitle(_) => ServerTag::SetTitle,
            ServerMessage::Quit => ServerTag::Quit,
            ServerMessage::FrameShmReady => ServerTag::FrameShmReady,
            ServerMessage::GameMessage { .. } => ServerTag::GameMessage,
            ServerMessage::PlayerStatus(_) => ServerTag::PlayerStatus,
            ServerMessage::MenuMessage(_) => ServerTag::MenuMessage,
            ServerMessage::AutomapTitle(_) => ServerTag::AutomapTitle,
            ServerMessage::Menu(_) => ServerTag::Menu,
            ServerMessage::Intermission(_) => ServerTag::Intermission,
            ServerMessage::FinaleText { .. } => ServerTag::FinaleText,
            ServerMessage::FinaleTextLength(_) => ServerTag::FinaleTextLength,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `msg` as one complete message into `buf`, flushing to `sink` as
/// the buffer fills.
///
/// Payloads that cannot be represented (too many menu items, a trailer that
/// does not fit the menu kind) are rejected before anything is written.
///
/// # Errors
///
/// Returns [`EncodeError`] if validation, string encoding or a flush fails.
/// A failure after the tag was written leaves the buffer marked as holding a
/// partial message.
pub fn encode_server_message<S: ByteSink + ?Sized>(
    buf: &mut SendBuffer,
    sink: &mut S,
    msg: &ServerMessage<'_>,
) -> Result<(), EncodeError> {
    validate(msg)?;

    let mut w = buf.begin(sink)?;
    w.write_u8(msg.tag() as u8)?;
    match *msg {
        ServerMessage::Frame {
            pixels,
            detached_ui,
        } => {
            w.write_bytes(pixels)?;
            w.write_u8(detached_ui.bits())?;
        }
        ServerMessage::SetTitle(s) | ServerMessage::MenuMessage(s) | ServerMessage::AutomapTitle(s) => {
            w.write_string(s)?;
        }
        ServerMessage::Quit | ServerMessage::FrameShmReady => {}
        ServerMessage::GameMessage { prefix, body } => {
            w.write_length_prefixed(&[prefix.as_bytes(), body.as_bytes()])?;
        }
        ServerMessage::PlayerStatus(status) => write_player_status(&mut w, status)?,
        ServerMessage::Menu(menu) => write_menu(&mut w, menu)?,
        ServerMessage::Intermission(snapshot) => write_intermission(&mut w, snapshot)?,
        ServerMessage::FinaleText { stage, text } => {
            w.write_u8(stage as u8)?;
            w.write_string(text)?;
        }
        ServerMessage::FinaleTextLength(count) => w.write_u16(count)?,
    }
    w.finish();
    Ok(())
}

/// Encodes the untagged handshake sent right after accept.
pub fn encode_init<S: ByteSink + ?Sized>(
    buf: &mut SendBuffer,
    sink: &mut S,
    init: Init,
) -> Result<(), EncodeError> {
    let mut w = buf.begin(sink)?;
    w.write_u16(init.width)?;
    w.write_u16(init.height)?;
    w.finish();
    Ok(())
}

/// Encodes a client → host message.
///
/// # Errors
///
/// Returns [`EncodeError::StringTooLong`] if a string exceeds 65535 bytes.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, EncodeError> {
    let mut out = vec![msg.tag() as u8];
    match msg {
        ClientMessage::WantFrame => {}
        ClientMessage::PressKey { key, pressed } => out.extend_from_slice(&[*key, *pressed]),
        ClientMessage::SetFrameShmName { name } => push_string(&mut out, name)?,
        ClientMessage::SetConfigVar { name, value } => {
            push_string(&mut out, name.as_bytes())?;
            push_string(&mut out, value.as_bytes())?;
        }
    }
    Ok(out)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn validate(msg: &ServerMessage<'_>) -> Result<(), EncodeError> {
    if let ServerMessage::Menu(menu) = msg {
        if u16::try_from(menu.items.len()).is_err() {
            return Err(EncodeError::InvalidPayload("more than 65535 menu items"));
        }
        if !menu.trailer.matches(menu.kind) {
            return Err(EncodeError::InvalidPayload("menu trailer does not match menu kind"));
        }
        if let MenuTrailer::SaveSlots { slots, .. } = &menu.trailer {
            if u16::try_from(slots.len()).is_err() {
                return Err(EncodeError::InvalidPayload("more than 65535 save slots"));
            }
        }
    }
    Ok(())
}

fn write_player_status<S: ByteSink + ?Sized>(
    w: &mut MessageWriter<'_, S>,
    status: &PlayerStatus,
) -> Result<(), EncodeError> {
    w.write_i16(status.health)?;
    w.write_i16(status.armor)?;
    w.write_i16(status.ready_ammo)?;
    for &ammo in &status.ammo {
        w.write_i16(ammo)?;
    }
    for &max in &status.max_ammo {
        w.write_i16(max)?;
    }
    w.write_u8(status.arms.0)?;
    w.write_u8(status.keys.0)
}

fn write_menu<S: ByteSink + ?Sized>(
    w: &mut MessageWriter<'_, S>,
    menu: &MenuSnapshot,
) -> Result<(), EncodeError> {
    w.write_u8(menu.kind as u8)?;
    // Counts were range-checked in validate().
    w.write_u16(menu.items.len() as u16)?;
    for item in &menu.items {
        w.write_string(item)?;
    }
    w.write_u8(menu.selected)?;

    match &menu.trailer {
        MenuTrailer::None => {}
        MenuTrailer::Options {
            low_detail,
            messages_on,
            mouse_sensitivity,
            screen_size,
        } => {
            w.write_u8(u8::from(*low_detail) | u8::from(*messages_on) << 1)?;
            w.write_i8(*mouse_sensitivity)?;
            w.write_i8(*screen_size)?;
        }
        MenuTrailer::Sound {
            sfx_volume,
            music_volume,
        } => {
            w.write_i8(*sfx_volume)?;
            w.write_i8(*music_volume)?;
        }
        MenuTrailer::SaveSlots { slots, edit_index } => {
            w.write_u16(slots.len() as u16)?;
            for slot in slots {
                w.write_string(slot)?;
            }
            w.write_i8(*edit_index)?;
        }
    }
    Ok(())
}

fn write_intermission<S: ByteSink + ?Sized>(
    w: &mut MessageWriter<'_, S>,
    snapshot: &IntermissionSnapshot,
) -> Result<(), EncodeError> {
    w.write_i8(snapshot.state as i8)?;
    if snapshot.state == IntermissionState::StatCount {
        let s = &snapshot.stats;
        w.write_i32(s.kills_percent)?;
        w.write_i32(s.items_percent)?;
        w.write_i32(s.secrets_percent)?;
        w.write_i32(s.time_secs)?;
        w.write_i32(s.par_secs)?;
    }
    Ok(())
}

fn push_string(out: &mut Vec<u8>, s: &[u8]) -> Result<(), EncodeError> {
    let len = u16::try_from(s.len()).map_err(|_| EncodeError::StringTooLong(s.len()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
