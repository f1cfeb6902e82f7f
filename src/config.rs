//! Configuration types for the rehearsal session.

use crate::voice::Accent;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the session controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Speech capture settings.
    pub capture: CaptureConfig,
    /// Synthesis playback settings.
    pub playback: PlaybackConfig,
    /// Simulation endpoint settings.
    pub simulation: SimulationConfig,
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// BCP-47 locale handed to the recognition engine.
    pub locale: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            locale: "en-IN".to_owned(),
        }
    }
}

/// Synthesis playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Accent preference used to resolve a synthesis voice.
    pub accent: Accent,
    /// Speaking rate multiplier (1.0 = engine default).
    pub rate: f32,
    /// Pitch multiplier (1.0 = engine default).
    pub pitch: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            accent: Accent::Indian,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Simulation endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Full URL of the simulation endpoint.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/simulate".to_owned(),
            timeout_secs: 30,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SessionError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SessionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/pitchloop/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/pitchloop-config"))
            .join("pitchloop")
            .join("config.toml")
    }
}
