//! doomlink-host entry point.
//!
//! Serves one detached-UI client from a test-pattern stand-in game.
//!
//! # Usage
//!
//! ```text
//! doomlink-host --listen /tmp/doom.sock [--config host.toml] [--max-ticks N]
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ HostConfig::load()         -- defaults when no file
//!  └─ CancelToken::register_signals()
//!  └─ runner::run()
//!       ├─ Listener::bind / accept
//!       ├─ tick loop over TestPatternHost
//!       └─ Session::shutdown
//! ```
//!
//! Exit status is non-zero when the session ends on a fatal error.
//! SIGINT/SIGTERM stop the loop cleanly and exit zero.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use doomlink_host::application::demo::TestPatternHost;
use doomlink_host::{run, CancelToken, HostConfig, RunOptions};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "doomlink-host",
    about = "Serves frames and UI state to a detached doomlink client over a Unix socket",
    version
)]
struct Cli {
    /// Filesystem path of the listening Unix socket.
    #[arg(long, env = "DOOMLINK_LISTEN")]
    listen: PathBuf,

    /// TOML config file.  A missing file means defaults.
    #[arg(long, env = "DOOMLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many ticks instead of running until signalled.
    #[arg(long)]
    max_ticks: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = HostConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("loading config from {}", path.display()),
        None => "loading default config".to_string(),
    })?;

    // RUST_LOG wins over the config file's level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        listen = %cli.listen.display(),
        width = config.screen_width,
        height = config.screen_height,
        tick_rate_hz = config.tick_rate_hz,
        "doomlink-host starting"
    );

    let cancel = CancelToken::new();
    cancel
        .register_signals()
        .context("installing SIGINT/SIGTERM handlers")?;

    let mut host = TestPatternHost::new(config.screen_width, config.screen_height, config.tick_rate_hz);
    let options = RunOptions {
        listen: cli.listen,
        max_ticks: cli.max_ticks,
    };
    let reason = run(&options, &config, &mut host, &cancel).context("session ended with an error")?;

    info!(?reason, ticks = host.ticks(), "doomlink-host stopped");
    Ok(())
}
