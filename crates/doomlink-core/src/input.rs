//! Queue of key events received from the client, and their translation into
//! game input.
//!
//! Events are stored as `(key, pressed)` byte pairs in a [`RingBuffer`] so
//! the queue has a fixed footprint.  A pair is only ever written whole, so
//! the consumer never observes half an event.

use tracing::warn;

use crate::buffer::ring::{RingBuffer, RING_SIZE};
use crate::protocol::messages::MOUSE_BUTTONS_SENTINEL;

/// A key or mouse-button event ready for the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEvent {
    KeyDown(u8),
    KeyUp(u8),
    /// Bitmask of the mouse buttons currently held.
    MouseButtons(u8),
}

impl InputEvent {
    /// Translates a raw `(key, pressed)` pair.
    ///
    /// Upper-case ASCII letters are folded to lower case, which is how the
    /// game names letter keys.
    pub fn from_raw(key: u8, pressed: u8) -> Self {
        if pressed == MOUSE_BUTTONS_SENTINEL {
            return InputEvent::MouseButtons(key);
        }
        let key = key.to_ascii_lowercase();
        if pressed != 0 {
            InputEvent::KeyDown(key)
        } else {
            InputEvent::KeyUp(key)
        }
    }
}

/// Bounded FIFO of raw key events.
#[derive(Debug, Default)]
pub struct KeyQueue<const N: usize = RING_SIZE> {
    ring: RingBuffer<N>,
}

impl<const N: usize> KeyQueue<N> {
    pub fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.ring.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Queues an event.  Returns `false` and drops the event when the queue
    /// has no room for a full pair.
    pub fn push(&mut self, key: u8, pressed: u8) -> bool {
        if self.ring.len() + 2 > self.ring.capacity() {
            warn!(key, pressed, "key event queue full; dropping event");
            return false;
        }
        self.ring.write_bytes(&[key, pressed]).is_ok()
    }

    /// Removes and translates the oldest queued event.
    pub fn pop(&mut self) -> Option<InputEvent> {
        let mut pair = [0u8; 2];
        if !self.ring.read_bytes(&mut pair) {
            return None;
        }
        self.ring.reset_if_empty();
        Some(InputEvent::from_raw(pair[0], pair[1]))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
