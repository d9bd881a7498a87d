//! TOML configuration for the host binary.
//!
//! Every field has a default, so an absent file and an empty file both yield
//! a usable configuration:
//!
//! ```toml
//! screen_width = 320
//! screen_height = 200
//! tick_rate_hz = 35
//! accept_poll_ms = 50
//! log_level = "info"
//! send_buffer_frames = 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use doomlink_core::protocol::messages::{frame_size, DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Host settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    /// Frame width in pixels.
    #[serde(default = "default_screen_width")]
    pub screen_width: u16,
    /// Frame height in pixels.
    #[serde(default = "default_screen_height")]
    pub screen_height: u16,
    /// Simulation ticks per second.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,
    /// How often the listener is polled while waiting for a client.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Send buffer size, in whole frames.
    #[serde(default = "default_send_buffer_frames")]
    pub send_buffer_frames: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_screen_width() -> u16 {
    DEFAULT_SCREEN_WIDTH
}
fn default_screen_height() -> u16 {
    DEFAULT_SCREEN_HEIGHT
}
fn default_tick_rate_hz() -> u32 {
    35
}
fn default_accept_poll_ms() -> u64 {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_send_buffer_frames() -> usize {
    2
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            tick_rate_hz: default_tick_rate_hz(),
            accept_poll_ms: default_accept_poll_ms(),
            log_level: default_log_level(),
            send_buffer_frames: default_send_buffer_frames(),
        }
    }
}

impl HostConfig {
    /// Loads the config at `path`, or defaults when `path` is `None` or the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse, or
    /// holds unusable values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects values the host cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(ConfigError::Invalid {
                field: "screen_width/screen_height",
                reason: "must be non-zero",
            });
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_rate_hz",
                reason: "must be non-zero",
            });
        }
        if self.send_buffer_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "send_buffer_frames",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Bytes in one frame at the configured resolution.
    pub fn frame_size(&self) -> usize {
        frame_size(self.screen_width, self.screen_height)
    }

    /// Send buffer size in bytes.
    pub fn send_capacity(&self) -> usize {
        self.send_buffer_frames.saturating_mul(self.frame_size())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_matches_classic_resolution() {
        let config = HostConfig::default();

        assert_eq!((config.screen_width, config.screen_height), (320, 200));
        assert_eq!(config.send_capacity(), 2 * 320 * 200 * 3);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_without_path_gives_defaults() {
        assert_eq!(HostConfig::load(None).unwrap(), HostConfig::default());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let config = HostConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn test_load_partial_file_fills_in_defaults() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "screen_width = 640\ntick_rate_hz = 70").unwrap();

        // Act
        let config = HostConfig::load(Some(file.path())).unwrap();

        // Assert
        assert_eq!(config.screen_width, 640);
        assert_eq!(config.screen_height, 200);
        assert_eq!(config.tick_rate_hz, 70);
        assert_eq!(config.accept_poll_ms, 50);
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = HostConfig::from_toml("screen_width = \"wide\"").unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_tick_rate_is_rejected() {
        let err = HostConfig::from_toml("tick_rate_hz = 0").unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { field: "tick_rate_hz", .. }));
    }

    #[test]
    fn test_tick_interval_from_rate() {
        let config = HostConfig {
            tick_rate_hz: 50,
            ..Default::default()
        };

        assert_eq!(config.tick_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_toml_output_parses_back() {
        let config = HostConfig {
            screen_width: 800,
            log_level: "debug".into(),
            ..Default::default()
        };

        let text = config.to_toml().unwrap();

        assert_eq!(HostConfig::from_toml(&text).unwrap(), config);
    }
}
