//! Runtime configuration for controllers and the bundled WAV engine.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
use crate::engine::io::ExportFormat;
use crate::error::{PreviewError, Result};

/// Default progress cadence (updates per second)
pub const DEFAULT_PROGRESS_RATE_HZ: f64 = 30.0;

/// Default linear gain for both tracks
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Slowest accepted progress cadence (updates per second)
pub const MIN_PROGRESS_RATE_HZ: f64 = 0.1;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub engine: EngineConfig,
    pub playback: PlaybackConfig,
    pub export: ExportConfig,
}

impl PreviewConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: PreviewConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.sample_rate == 0 {
            return Err(PreviewError::invalid_config("engine sample rate must be positive"));
        }
        let rate = self.playback.progress_updates_per_second;
        if !rate.is_finite() || rate < MIN_PROGRESS_RATE_HZ {
            return Err(PreviewError::invalid_config(format!(
                "progress rate must be at least {} Hz, got {}",
                MIN_PROGRESS_RATE_HZ, rate
            )));
        }
        if self.export.sample_rate == 0 {
            return Err(PreviewError::invalid_config("export sample rate must be positive"));
        }
        if !matches!(self.export.bit_depth, 16 | 24 | 32) {
            return Err(PreviewError::invalid_config(format!(
                "unsupported export bit depth {}",
                self.export.bit_depth
            )));
        }
        Ok(())
    }
}

/// Settings for [`crate::engine::WavRenderer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate every source is resampled to on import
    pub sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: INTERNAL_SAMPLE_RATE,
        }
    }
}

/// Settings for [`crate::player::PlaybackController`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub progress_updates_per_second: f64,
    pub vocal_volume: f32,
    pub background_volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_updates_per_second: DEFAULT_PROGRESS_RATE_HZ,
            vocal_volume: DEFAULT_VOLUME,
            background_volume: DEFAULT_VOLUME,
        }
    }
}

impl PlaybackConfig {
    /// Ticker period; an unusable rate falls back to the default
    pub(crate) fn tick_interval(&self) -> std::time::Duration {
        let rate = self.progress_updates_per_second;
        let fallback = std::time::Duration::from_secs_f64(1.0 / DEFAULT_PROGRESS_RATE_HZ);
        if !rate.is_finite() || rate < MIN_PROGRESS_RATE_HZ {
            return fallback;
        }
        std::time::Duration::try_from_secs_f64(1.0 / rate).unwrap_or(fallback)
    }
}

/// Settings for [`crate::export::ExportController`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub sample_rate: u32,
    pub bit_depth: u16,
    /// Background gain used when a request does not specify one
    pub default_background_volume: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let format = ExportFormat::default();
        Self {
            sample_rate: format.sample_rate,
            bit_depth: format.bit_depth,
            default_background_volume: DEFAULT_VOLUME,
        }
    }
}

impl ExportConfig {
    pub fn format(&self) -> ExportFormat {
        ExportFormat::new(self.sample_rate, self.bit_depth)
    }
}
