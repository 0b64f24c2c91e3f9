//! Player configuration.

use std::path::Path;

use fbs_core::DecoderConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Decoder limits and overrun policy.
    pub decoder: DecoderConfig,
    /// What to play.
    pub playback: PlaybackConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Playback settings. Command-line flags override these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Stop after this many frames; 0 plays to the end.
    pub max_frames: u64,
    /// Seek here before playing.
    pub seek_ms: Option<u32>,
    /// Write the final framebuffer to this PPM file.
    pub dump: Option<String>,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (overridden by `RUST_LOG`).
    pub level: String,
    /// Optional log file; empty logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from.
///
/// The logging section lives in the file itself, so the outcome is
/// reported once tracing has been set up from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Missing,
    Invalid(String),
}

impl ConfigSource {
    pub fn log(&self, path: &Path) {
        match self {
            Self::File => tracing::info!("config loaded from {}", path.display()),
            Self::Missing => tracing::info!("no config at {}; using defaults", path.display()),
            Self::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl PlayerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        std::fs::write(path, Self::default_toml()?)
    }

    /// The default configuration as TOML.
    pub fn default_toml() -> std::io::Result<String> {
        toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)
    }
}

// ── Tests ────────────────────────────────────────────────────────
