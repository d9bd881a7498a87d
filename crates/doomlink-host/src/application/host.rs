//! The seams between the transport and the game it serves.
//!
//! The game is an external collaborator.  It is reached only through these
//! traits, implemented by the game (or by [`TestPatternHost`] in the demo
//! binary).
//!
//! [`TestPatternHost`]: crate::application::demo::TestPatternHost

use doomlink_core::protocol::messages::PlayerStatus;
use doomlink_core::InputEvent;

use crate::application::session::{Session, SessionError};

/// Receives config variable changes requested by the client.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigSink {
    /// Applies `value` to the variable `name`.
    ///
    /// Returns `false` if no such variable is bound.  That is not fatal.
    fn set_variable(&mut self, name: &str, value: &str) -> bool;
}

/// The simulation side of a session.
pub trait GameHost: ConfigSink {
    /// Called once after the handshake is queued, before the first tick.
    fn on_connect(&mut self, _session: &mut Session) -> Result<(), SessionError> {
        Ok(())
    }

    /// Current status bar, or `None` while not in a level.
    fn player_status(&self) -> Option<PlayerStatus>;

    /// One input event from the client, oldest first.
    fn handle_input(&mut self, event: InputEvent);

    /// Runs one simulation tick.  Rendering and UI text are pushed through
    /// `session`; `Session::wants_frame` says whether a frame is due.
    fn tick(&mut self, session: &mut Session) -> Result<(), SessionError>;
}
