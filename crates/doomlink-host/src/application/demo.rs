//! Stand-in game for the `doomlink-host` binary.
//!
//! Renders a scrolling RGB gradient whenever the client asks for a frame,
//! cycles the status bar every few seconds and echoes key presses back as
//! HUD messages.  Enough to exercise a client end to end without a game.

use std::collections::HashMap;

use doomlink_core::protocol::messages::{ArmsBits, KeyBits, PlayerStatus, BYTES_PER_PIXEL, NUM_AMMO};
use doomlink_core::InputEvent;
use tracing::{debug, info};

use crate::application::host::{ConfigSink, GameHost};
use crate::application::session::{Session, SessionError};

/// Window title sent on connect.
pub const TITLE: &str = "doomlink test pattern";

/// Config variables the demo accepts.  Anything else is reported unbound.
const KNOWN_VARIABLES: &[&str] = &[
    "screenblocks",
    "usegamma",
    "mouse_sensitivity",
    "show_messages",
    "detaillevel",
    "sfx_volume",
    "music_volume",
];

pub struct TestPatternHost {
    width: usize,
    height: usize,
    /// Ticks between status bar changes.
    status_period: u64,
    ticks: u64,
    pixels: Vec<u8>,
    variables: HashMap<String, String>,
    pending_message: Option<String>,
}

impl TestPatternHost {
    pub fn new(width: u16, height: u16, tick_rate_hz: u32) -> Self {
        let (width, height) = (usize::from(width), usize::from(height));
        Self {
            width,
            height,
            status_period: u64::from(tick_rate_hz.max(1)) * 3,
            ticks: 0,
            pixels: vec![0; width * height * BYTES_PER_PIXEL],
            variables: HashMap::new(),
            pending_message: None,
        }
    }

    /// Value last set for `name` by the client.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn render(&mut self) {
        let shift = self.ticks as usize;
        for (i, px) in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let (x, y) = (i % self.width, i / self.width);
            px[0] = ((x + shift) * 255 / self.width.max(1)) as u8;
            px[1] = ((y + shift) * 255 / self.height.max(1)) as u8;
            px[2] = (x ^ y) as u8;
        }
    }
}

impl ConfigSink for TestPatternHost {
    fn set_variable(&mut self, name: &str, value: &str) -> bool {
        if !KNOWN_VARIABLES.contains(&name) {
            return false;
        }
        info!(name, value, "config variable set");
        self.variables.insert(name.to_owned(), value.to_owned());
        true
    }
}

impl GameHost for TestPatternHost {
    fn on_connect(&mut self, session: &mut Session) -> Result<(), SessionError> {
        session.send_title(TITLE)
    }

    fn player_status(&self) -> Option<PlayerStatus> {
        let phase = ((self.ticks / self.status_period) % 60) as i16;
        let health = 100 - (phase * 7) % 100;
        let mut owned = [false; 6];
        owned[(phase as usize) % owned.len()] = true;
        Some(PlayerStatus {
            health,
            armor: (phase * 5) % 200,
            ready_ammo: 50,
            ammo: [50; NUM_AMMO],
            max_ammo: [200, 50, 300, 50],
            arms: ArmsBits::from_slots(owned),
            keys: KeyBits::new(phase % 2 == 1, phase % 3 == 1, phase % 5 == 1),
        })
    }

    fn handle_input(&mut self, event: InputEvent) {
        debug!(?event, "input");
        if let InputEvent::KeyDown(key) = event {
            self.pending_message = Some(format!("key 0x{key:02x} pressed"));
        }
    }

    fn tick(&mut self, session: &mut Session) -> Result<(), SessionError> {
        self.ticks += 1;
        if let Some(message) = self.pending_message.take() {
            session.send_game_message("", &message)?;
        }
        if session.wants_frame() {
            self.render();
            session.send_frame(&self.pixels)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
