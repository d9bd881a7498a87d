//! The tick loop: listen, accept one client, drive the game until told to
//! stop, then tear the session down.
//!
//! ```text
//! run()
//!  ├─ Listener::bind ─► accept (polls, honours cancellation)
//!  ├─ Session::new   ─► Init queued
//!  ├─ GameHost::on_connect
//!  ├─ drive()  one turn per tick:
//!  │    status (if in a level) → flush → pump_input → deliver input → tick → pace
//!  └─ Session::shutdown (always)
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::application::host::GameHost;
use crate::application::session::{Session, SessionError, SessionParams};
use crate::config::HostConfig;
use crate::infrastructure::signal::CancelToken;
use crate::infrastructure::transport::{Listener, TransportError};

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT/SIGTERM or an explicit [`CancelToken::cancel`].
    Cancelled,
    /// The configured tick limit was reached.
    TickLimit,
}

/// Per-run settings that do not come from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Filesystem path of the listening socket.
    pub listen: PathBuf,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

/// Tick timing for [`drive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Minimum wall time per tick.  Zero runs ticks back to back.
    pub tick_interval: Duration,
    pub max_ticks: Option<u64>,
}

/// Serves one client from bind to shutdown.
///
/// # Errors
///
/// Returns the fatal [`SessionError`] that ended the run.  Cancellation is
/// reported as `Ok(StopReason::Cancelled)`.
pub fn run<H: GameHost + ?Sized>(
    options: &RunOptions,
    config: &HostConfig,
    host: &mut H,
    cancel: &CancelToken,
) -> Result<StopReason, SessionError> {
    let listener = Listener::bind(&options.listen)?;
    let conn = match listener.accept(cancel, config.accept_poll_interval()) {
        Ok(conn) => conn,
        Err(TransportError::Cancelled) => {
            info!("cancelled while waiting for a client");
            return Ok(StopReason::Cancelled);
        }
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    let mut session = Session::new(conn, SessionParams::from(config), cancel.clone())?;
    let pacing = Pacing {
        tick_interval: config.tick_interval(),
        max_ticks: options.max_ticks,
    };
    let result = host
        .on_connect(&mut session)
        .and_then(|()| drive(&mut session, host, pacing));
    session.shutdown();

    match result {
        Ok(reason) => {
            info!(?reason, "session finished");
            Ok(reason)
        }
        Err(SessionError::Cancelled) => {
            info!("session cancelled");
            Ok(StopReason::Cancelled)
        }
        Err(e) => {
            error!("{e}");
            Err(e)
        }
    }
}

/// Runs ticks on an established session until the tick limit, cancellation
/// or a fatal error.  Does not shut the session down.
pub fn drive<H: GameHost + ?Sized>(
    session: &mut Session,
    host: &mut H,
    pacing: Pacing,
) -> Result<StopReason, SessionError> {
    let mut ticks: u64 = 0;
    let mut next_deadline = Instant::now();

    loop {
        if session.cancel_token().is_cancelled() {
            return Ok(StopReason::Cancelled);
        }
        if pacing.max_ticks.is_some_and(|max| ticks >= max) {
            return Ok(StopReason::TickLimit);
        }

        if let Some(status) = host.player_status() {
            session.send_player_status(&status)?;
        }
        session.flush()?;
        session.pump_input(host)?;
        while let Some(event) = session.next_input() {
            host.handle_input(event);
        }
        host.tick(session)?;
        ticks += 1;

        if !pacing.tick_interval.is_zero() {
            next_deadline += pacing.tick_interval;
            let now = Instant::now();
            if next_deadline > now {
                if !sleep_until(next_deadline, session.cancel_token()) {
                    return Ok(StopReason::Cancelled);
                }
            } else {
                // Fell behind; do not try to catch up with a burst of ticks.
                debug!(behind = ?(now - next_deadline), "tick overran its slot");
                next_deadline = now;
            }
        }
    }
}

/// Longest single sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Sleeps until `deadline` in short slices.  Returns `false` as soon as
/// `cancel` is set.
fn sleep_until(deadline: Instant, cancel: &CancelToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
