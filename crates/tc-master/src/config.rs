//! Configuration (`config.toml` in the platform config directory).
//!
//! Every field has a default matching the reference tone, so an empty or
//! missing file yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tc_engine::{ParamError, ToneParams};

/// Number of times a caller repeats each command by default.
pub const COMMAND_REPEAT_COUNT: usize = 2;

/// Error type for loading and saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid tone settings: {0}")]
    Tone(#[from] ParamError),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Carrier tone settings
    #[serde(default)]
    pub tone: ToneConfig,
    /// Output device and repeat policy
    #[serde(default)]
    pub output: OutputConfig,
}

/// Carrier tone configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneConfig {
    /// Output sample rate in Hz (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Carrier frequency in Hz (default: 2000)
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Peak sample magnitude (default: 32767)
    #[serde(default = "default_amplitude")]
    pub amplitude: u32,
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Device to use, matched by name at startup (default: system default)
    #[serde(default)]
    pub device_name: Option<String>,
    /// Transmissions per command (default: 2)
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_sample_rate() -> u32 {
    ToneParams::REFERENCE.sample_rate()
}
fn default_frequency() -> u32 {
    ToneParams::REFERENCE.frequency()
}
fn default_amplitude() -> u32 {
    ToneParams::REFERENCE.amplitude()
}
fn default_repeat() -> usize {
    COMMAND_REPEAT_COUNT
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frequency: default_frequency(),
            amplitude: default_amplitude(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            repeat: default_repeat(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Platform config file location, e.g. `~/.config/treadchirp/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "treadchirp")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `path` if given (it must exist), else the default file if it
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn tone_params(&self) -> Result<ToneParams, ConfigError> {
        Ok(ToneParams::new(
            self.tone.sample_rate,
            self.tone.frequency,
            self.tone.amplitude,
        )?)
    }
}
