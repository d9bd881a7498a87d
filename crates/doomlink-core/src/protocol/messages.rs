//! Message catalog for the detached-UI link.
//!
//! Every message starts with a one-byte tag.  Multi-byte integers are
//! little-endian; strings are a `u16` byte length followed by the raw bytes
//! (no terminator).  Tags for the two directions overlap: the meaning of a
//! tag depends on who sent it.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Bytes per pixel in a frame (R8G8B8).
pub const BYTES_PER_PIXEL: usize = 3;

/// Default frame width in pixels.
pub const DEFAULT_SCREEN_WIDTH: u16 = 320;

/// Default frame height in pixels.
pub const DEFAULT_SCREEN_HEIGHT: u16 = 200;

/// Longest shared-memory object name accepted from the client.
pub const MAX_SHM_NAME_LEN: usize = 254;

/// Longest configuration variable name accepted from the client.
pub const MAX_CONFIG_NAME_LEN: usize = 63;

/// Longest configuration value accepted from the client.
pub const MAX_CONFIG_VALUE_LEN: usize = 127;

/// `pressed` value marking a press-key message as a mouse-button bitmask.
pub const MOUSE_BUTTONS_SENTINEL: u8 = 0xFF;

/// Number of ammo types reported in [`PlayerStatus`].
pub const NUM_AMMO: usize = 4;

/// Longest string the wire format can represent.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Size in bytes of one frame of the given dimensions.
pub fn frame_size(width: u16, height: u16) -> usize {
    usize::from(width) * usize::from(height) * BYTES_PER_PIXEL
}

// ── Tags ──────────────────────────────────────────────────────────────────────

/// Tags of messages sent by the host to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerTag {
    Frame = 0,
    SetTitle = 1,
    Quit = 2,
    FrameShmReady = 3,
    GameMessage = 4,
    PlayerStatus = 5,
    MenuMessage = 6,
    AutomapTitle = 7,
    Menu = 8,
    Intermission = 9,
    FinaleText = 10,
    FinaleTextLength = 11,
}

impl TryFrom<u8> for ServerTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(ServerTag::Frame),
            1 => Ok(ServerTag::SetTitle),
            2 => Ok(ServerTag::Quit),
            3 => Ok(ServerTag::FrameShmReady),
            4 => Ok(ServerTag::GameMessage),
            5 => Ok(ServerTag::PlayerStatus),
            6 => Ok(ServerTag::MenuMessage),
            7 => Ok(ServerTag::AutomapTitle),
            8 => Ok(ServerTag::Menu),
            9 => Ok(ServerTag::Intermission),
            10 => Ok(ServerTag::FinaleText),
            11 => Ok(ServerTag::FinaleTextLength),
            other => Err(other),
        }
    }
}

/// Tags of messages sent by the client to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientTag {
    WantFrame = 0,
    PressKey = 1,
    SetFrameShmName = 2,
    SetConfigVar = 3,
}

impl TryFrom<u8> for ClientTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(ClientTag::WantFrame),
            1 => Ok(ClientTag::PressKey),
            2 => Ok(ClientTag::SetFrameShmName),
            3 => Ok(ClientTag::SetConfigVar),
            other => Err(other),
        }
    }
}

// ── Inbound messages ──────────────────────────────────────────────────────────

/// A fully decoded client → host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// The client is ready for the next frame.
    WantFrame,
    /// A key changed state, or (when `pressed` is [`MOUSE_BUTTONS_SENTINEL`])
    /// the full set of held mouse buttons.
    PressKey { key: u8, pressed: u8 },
    /// Deliver frames through the named shared-memory object; empty disables.
    /// The name is raw bytes, passed to `shm_open` unchanged.
    SetFrameShmName { name: Vec<u8> },
    /// Set a game configuration variable.
    SetConfigVar { name: String, value: String },
}

impl ClientMessage {
    pub fn tag(&self) -> ClientTag {
        match self {
            ClientMessage::WantFrame => ClientTag::WantFrame,
            ClientMessage::PressKey { .. } => ClientTag::PressKey,
            ClientMessage::SetFrameShmName { .. } => ClientTag::SetFrameShmName,
            ClientMessage::SetConfigVar { .. } => ClientTag::SetConfigVar,
        }
    }
}

// ── Outbound payloads ─────────────────────────────────────────────────────────

/// Untagged greeting sent once right after the connection is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Init {
    pub width: u16,
    pub height: u16,
}

/// Bitmask of UI elements the client should draw itself on top of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DetachedUi(u8);

impl DetachedUi {
    /// The centred menu prompt ("are you sure? (y/n)").
    pub const MENU_MESSAGE: DetachedUi = DetachedUi(1 << 0);

    pub const fn empty() -> Self {
        DetachedUi(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        DetachedUi(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: DetachedUi) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DetachedUi) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Weapon ownership bits for slots 2–7 (bit 0 is slot 2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArmsBits(pub u8);

impl ArmsBits {
    /// Builds the mask from per-slot ownership flags for slots 2 through 7.
    pub fn from_slots(owned: [bool; 6]) -> Self {
        let bits = owned
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &has)| acc | (u8::from(has) << i));
        ArmsBits(bits)
    }

    /// Whether the weapon in `slot` (2–7) is owned.
    pub fn has_slot(self, slot: u8) -> bool {
        (2..=7).contains(&slot) && self.0 & (1 << (slot - 2)) != 0
    }
}

/// Keycard/skull ownership bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyBits(pub u8);

impl KeyBits {
    pub const BLUE: u8 = 1 << 0;
    pub const YELLOW: u8 = 1 << 1;
    pub const RED: u8 = 1 << 2;

    pub fn new(blue: bool, yellow: bool, red: bool) -> Self {
        let mut bits = 0;
        if blue {
            bits |= Self::BLUE;
        }
        if yellow {
            bits |= Self::YELLOW;
        }
        if red {
            bits |= Self::RED;
        }
        KeyBits(bits)
    }
}

/// Status bar snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub health: i16,
    pub armor: i16,
    pub ready_ammo: i16,
    pub ammo: [i16; NUM_AMMO],
    pub max_ammo: [i16; NUM_AMMO],
    pub arms: ArmsBits,
    pub keys: KeyBits,
}

/// Menu screens the client knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MenuKind {
    Main = 0,
    Episode = 1,
    NewGame = 2,
    Options = 3,
    ReadThis1 = 4,
    ReadThis2 = 5,
    Sound = 6,
    LoadGame = 7,
    SaveGame = 8,
}

impl TryFrom<u8> for MenuKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(MenuKind::Main),
            1 => Ok(MenuKind::Episode),
            2 => Ok(MenuKind::NewGame),
            3 => Ok(MenuKind::Options),
            4 => Ok(MenuKind::ReadThis1),
            5 => Ok(MenuKind::ReadThis2),
            6 => Ok(MenuKind::Sound),
            7 => Ok(MenuKind::LoadGame),
            8 => Ok(MenuKind::SaveGame),
            other => Err(other),
        }
    }
}

/// Kind-specific fields following the menu items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuTrailer {
    None,
    Options {
        low_detail: bool,
        messages_on: bool,
        mouse_sensitivity: i8,
        screen_size: i8,
    },
    Sound {
        sfx_volume: i8,
        music_volume: i8,
    },
    SaveSlots {
        slots: Vec<String>,
        /// Slot whose description is being typed, or -1.
        edit_index: i8,
    },
}

impl MenuTrailer {
    /// The trailer shape a menu of `kind` carries on the wire.
    pub fn matches(&self, kind: MenuKind) -> bool {
        matches!(
            (kind, self),
            (MenuKind::Options, MenuTrailer::Options { .. })
                | (MenuKind::Sound, MenuTrailer::Sound { .. })
                | (MenuKind::LoadGame | MenuKind::SaveGame, MenuTrailer::SaveSlots { .. })
                | (
                    MenuKind::Main
                        | MenuKind::Episode
                        | MenuKind::NewGame
                        | MenuKind::ReadThis1
                        | MenuKind::ReadThis2,
                    MenuTrailer::None
                )
        )
    }
}

/// A menu screen: item labels (graphic lump names), cursor and trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSnapshot {
    pub kind: MenuKind,
    pub items: Vec<String>,
    pub selected: u8,
    pub trailer: MenuTrailer,
}

/// Intermission screen phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum IntermissionState {
    NoState = -1,
    StatCount = 0,
    ShowNextLoc = 1,
}

/// Tally shown while the intermission counts up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntermissionStats {
    pub kills_percent: i32,
    pub items_percent: i32,
    pub secrets_percent: i32,
    pub time_secs: i32,
    pub par_secs: i32,
}

/// Intermission screen; stats travel only in [`IntermissionState::StatCount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermissionSnapshot {
    pub state: IntermissionState,
    pub stats: IntermissionStats,
}

/// Phase of the end-of-episode finale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FinaleStage {
    Text = 0,
    ArtScreen = 1,
    Cast = 2,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
