//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! arrival-config.toml file: which stop to watch, how often to refresh,
//! which display backend to prefer, and the physical matrix panel options.
//!
//! A missing config file is fine (sensible defaults apply); a config file
//! that exists but cannot be parsed is a startup-fatal [`ConfigError`],
//! since silently watching the wrong stop is worse than not starting.

use crate::render::BackendKind;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `display.backend` when set.
///
/// Recognized values mirror the config field: `matrix`, `pygame` (or
/// `window`), `console`. Anything else is warned about and ignored.
pub const BACKEND_ENV_VAR: &str = "ARRIVAL_BOARD_BACKEND";

/// Errors that make configuration unusable. These are fatal at startup;
/// nothing in the refresh loop ever reloads configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has fields of the wrong shape
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Application configuration loaded from arrival-config.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Provider stop identifier passed to the fetcher
    pub stop_id: String,
    /// Human-readable stop name shown as the display header
    pub stop_name: String,
    /// Cap on arrivals kept per fetch cycle
    pub max_arrivals: usize,
    /// Seconds between refresh cycles
    pub refresh_interval_seconds: u64,
    /// Arrival feed endpoint settings
    pub provider: ProviderConfig,
    /// Display backend selection and matrix panel options
    pub display: DisplayConfig,
}

/// Arrival feed endpoint configuration.
///
/// The feed contract is deliberately thin: GET the URL (with `STOP_ID`
/// substituted) and get back a JSON array of raw arrival records. Anything
/// provider-specific lives on the other side of that URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Endpoint template; the literal `STOP_ID` is replaced with `stop_id`
    pub arrivals_url: String,
    /// Bound on a single fetch, connection setup included
    pub timeout_seconds: u64,
}

/// Display backend selection and per-backend options
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Explicit backend override; `None` uses the default fallback chain
    /// (matrix, then window, then console)
    pub backend: Option<BackendKind>,
    /// Physical RGB matrix panel options
    pub matrix: MatrixConfig,
}

/// RGB matrix panel options, mirroring the hzeller driver's option set.
///
/// Defaults describe a single 32x64 panel on an adafruit-style hat at 60%
/// brightness.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub rows: u32,
    pub cols: u32,
    pub chain_length: u32,
    pub parallel: u32,
    pub hardware_mapping: String,
    pub gpio_slowdown: u32,
    /// Percent, 1-100
    pub brightness: u8,
    /// BDF font for the panel; relative paths resolve against the working
    /// directory. `None` looks for fonts/7x13.bdf (installed separately,
    /// e.g. from the hzeller driver distribution).
    pub font_path: Option<PathBuf>,
    /// RGB triple for arrival rows
    pub text_color: [u8; 3],
    /// RGB triple for the header row
    pub header_color: [u8; 3],
    /// How many arrival rows fit on the panel at once. Independent of the
    /// overall `max_arrivals`; extra records rotate through via the view
    /// cycle.
    pub max_arrivals: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stop_id: "305423".to_string(),
            stop_name: "Nassau Av / Manhattan Av".to_string(),
            max_arrivals: 10,
            refresh_interval_seconds: 60,
            provider: ProviderConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            arrivals_url: "http://localhost:8080/stops/STOP_ID/arrivals".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            backend: None,
            matrix: MatrixConfig::default(),
        }
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        MatrixConfig {
            rows: 32,
            cols: 64,
            chain_length: 1,
            parallel: 1,
            hardware_mapping: "adafruit-hat".to_string(),
            gpio_slowdown: 2,
            brightness: 60,
            font_path: None,
            text_color: [255, 255, 0],
            header_color: [255, 255, 255],
            max_arrivals: 2,
        }
    }
}

impl Config {
    /// Load configuration from arrival-config.toml in the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("arrival-config.toml")
    }

    /// Load configuration from the given path.
    ///
    /// A missing file falls back to defaults; an unreadable or malformed
    /// file is an error. In both the file and default cases the
    /// [`BACKEND_ENV_VAR`] override is applied last.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let config: Config =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            info!("loaded configuration for stop {}", config.stop_name);
            config
        } else {
            info!(
                "no config file at {}, using default configuration",
                path.display()
            );
            Config::default()
        };

        config.apply_env_override();
        Ok(config)
    }

    /// Apply the `ARRIVAL_BOARD_BACKEND` override, if present.
    fn apply_env_override(&mut self) {
        self.apply_backend_override(std::env::var(BACKEND_ENV_VAR).ok().as_deref());
    }

    /// Apply a backend override value on top of whatever the file set.
    /// A recognized token wins over `display.backend`; an unrecognized
    /// token is warned about and ignored. Takes the value as a parameter
    /// so tests can drive it without mutating process-global state.
    fn apply_backend_override(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            return;
        };
        match value.parse::<BackendKind>() {
            Ok(kind) => {
                info!("{} overrides display backend: {}", BACKEND_ENV_VAR, kind);
                self.display.backend = Some(kind);
            }
            Err(_) => {
                warn!(
                    "{}={} is not a recognized backend (matrix|pygame|console), ignoring",
                    BACKEND_ENV_VAR, value
                );
            }
        }
    }
}
