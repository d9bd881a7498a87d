//! doomlink-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the host do?
//!
//! The host runs inside the game process.  It listens on a Unix socket for a
//! single detached-UI client and then, once per game tick:
//!
//! 1. Sends the player status if it changed since the last send.
//! 2. Flushes everything buffered for the client.
//! 3. Reads whatever the client sent and decodes it, possibly picking up in
//!    the middle of a message left incomplete on an earlier tick.
//! 4. Hands key events to the game and runs the game tick.
//! 5. Sends a frame if the client asked for one, inline or through shared
//!    memory.
//!
//! Everything runs on the game thread.  SIGINT/SIGTERM only set a flag; the
//! loop notices it and shuts the session down cleanly.

/// Application layer: session, frame channel, game seams and the tick loop.
pub mod application;

/// TOML configuration.
pub mod config;

/// Infrastructure layer: socket transport, shared memory, signals.
pub mod infrastructure;

pub use application::host::{ConfigSink, GameHost};
pub use application::runner::{run, RunOptions, StopReason};
pub use application::session::{Session, SessionError, SessionParams};
pub use config::HostConfig;
pub use infrastructure::signal::CancelToken;
