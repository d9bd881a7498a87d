//! Cooperative cancellation driven by SIGINT/SIGTERM.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Shared "please stop" flag.
///
/// Signal handlers only set the flag; the tick loop and every syscall retry
/// point check it and unwind through the normal shutdown path.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers SIGINT and SIGTERM to set this token.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a handler cannot be installed.
    pub fn register_signals(&self) -> io::Result<()> {
        flag::register(SIGINT, Arc::clone(&self.flag))?;
        flag::register(SIGTERM, Arc::clone(&self.flag))?;
        Ok(())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
