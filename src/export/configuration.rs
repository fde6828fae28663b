use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_VOLUME;
use crate::error::{PreviewError, Result};

/// One export request: the window to render and the gains to render it with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    /// Window start on the aligned timeline, in seconds
    pub start_time: f64,
    /// Window length in seconds
    pub duration: f64,
    /// Gain applied to the selected vocal take
    pub audio_track_volume: f32,
    /// Gain applied to the background; the export default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_track_volume: Option<f32>,
}

impl ExportConfiguration {
    pub fn new(start_time: f64, duration: f64, audio_track_volume: f32) -> Self {
        Self {
            start_time,
            duration,
            audio_track_volume,
            background_track_volume: None,
        }
    }

    pub fn with_background_volume(
        start_time: f64,
        duration: f64,
        audio_track_volume: f32,
        background_track_volume: f32,
    ) -> Self {
        Self {
            background_track_volume: Some(background_track_volume),
            ..Self::new(start_time, duration, audio_track_volume)
        }
    }

    /// Background gain, falling back to `default`
    pub fn background_volume_or(&self, default: f32) -> f32 {
        self.background_track_volume.unwrap_or(default)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(PreviewError::invalid_config(format!(
                "export start must be >= 0, got {}",
                self.start_time
            )));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(PreviewError::invalid_config(format!(
                "export duration must be > 0, got {}",
                self.duration
            )));
        }
        check_volume("audio track volume", self.audio_track_volume)?;
        if let Some(volume) = self.background_track_volume {
            check_volume("background track volume", volume)?;
        }
        Ok(())
    }
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self::new(0.0, 0.0, DEFAULT_VOLUME)
    }
}

fn check_volume(name: &str, volume: f32) -> Result<()> {
    if volume.is_finite() && volume >= 0.0 {
        Ok(())
    } else {
        Err(PreviewError::invalid_config(format!(
            "{} must be >= 0, got {}",
            name, volume
        )))
    }
}
