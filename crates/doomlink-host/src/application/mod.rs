//! Application layer: the session and the loop that drives it.
//!
//! # What lives here?
//!
//! - **`session`** – Per-connection state and every operation the game loop
//!   calls: flush, pump input, send frames and UI text, shut down.
//!
//! - **`frame`** – Chooses between inline and shared-memory frame delivery.
//!
//! - **`host`** – The [`GameHost`](host::GameHost) and
//!   [`ConfigSink`](host::ConfigSink) traits the game implements.
//!
//! - **`runner`** – Bind, accept, tick until stopped, shut down.
//!
//! - **`demo`** – A test-pattern stand-in for the game, used by the binary.

pub mod demo;
pub mod frame;
pub mod host;
pub mod runner;
pub mod session;
