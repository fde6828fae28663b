//! Source track descriptor

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PreviewError, Result};

/// The three sources of a preview and their alignment.
///
/// Aligned timeline time `t` plays the vocal at `t` and the background at
/// `t + recording_start_time`. Values are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    background_track: Option<PathBuf>,
    original_vocal_track: PathBuf,
    processed_vocal_track: Option<PathBuf>,
    recording_start_time: f64,
}

impl TrackInfo {
    /// Start a descriptor from the original vocal recording
    ///
    /// # Example
    /// ```
    /// use preview_audio::TrackInfo;
    /// let info = TrackInfo::new("vocal.wav")
    ///     .with_background_track("backing.wav")
    ///     .with_recording_start_time(2.0);
    /// assert_eq!(info.recording_start_time(), 2.0);
    /// assert!(info.processed_vocal_track().is_none());
    /// ```
    pub fn new(original_vocal_track: impl Into<PathBuf>) -> Self {
        Self {
            background_track: None,
            original_vocal_track: original_vocal_track.into(),
            processed_vocal_track: None,
            recording_start_time: 0.0,
        }
    }

    /// Build a descriptor with every source present
    pub fn from_paths(
        background_track: impl Into<PathBuf>,
        original_vocal_track: impl Into<PathBuf>,
        processed_vocal_track: impl Into<PathBuf>,
        recording_start_time: f64,
    ) -> Self {
        Self::new(original_vocal_track)
            .with_background_track(background_track)
            .with_processed_vocal_track(processed_vocal_track)
            .with_recording_start_time(recording_start_time)
    }

    pub fn with_background_track(mut self, path: impl Into<PathBuf>) -> Self {
        self.background_track = Some(path.into());
        self
    }

    pub fn with_processed_vocal_track(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_vocal_track = Some(path.into());
        self
    }

    pub fn with_recording_start_time(mut self, seconds: f64) -> Self {
        self.recording_start_time = seconds;
        self
    }

    pub fn background_track(&self) -> Option<&Path> {
        self.background_track.as_deref()
    }

    pub fn original_vocal_track(&self) -> &Path {
        &self.original_vocal_track
    }

    pub fn processed_vocal_track(&self) -> Option<&Path> {
        self.processed_vocal_track.as_deref()
    }

    /// Position in the background track (seconds) where the recording began
    pub fn recording_start_time(&self) -> f64 {
        self.recording_start_time
    }

    /// Resolve which vocal take is audible
    pub fn vocal_track(&self, use_processed: bool) -> Result<&Path> {
        if !use_processed {
            return Ok(&self.original_vocal_track);
        }
        self.processed_vocal_track()
            .ok_or_else(|| PreviewError::SourceUnreadable {
                path: PathBuf::new(),
                reason: "processed vocal track selected but not provided".to_string(),
            })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.recording_start_time.is_finite() || self.recording_start_time < 0.0 {
            return Err(PreviewError::invalid_config(format!(
                "recording start time must be a non-negative number of seconds, got {}",
                self.recording_start_time
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paths() {
        let info = TrackInfo::from_paths("B.wav", "O.wav", "P.wav", 2.0);
        assert_eq!(info.background_track(), Some(Path::new("B.wav")));
        assert_eq!(info.original_vocal_track(), Path::new("O.wav"));
        assert_eq!(info.processed_vocal_track(), Some(Path::new("P.wav")));
        assert_eq!(info.recording_start_time(), 2.0);
    }

    #[test]
    fn test_vocal_track_selection() {
        let info = TrackInfo::from_paths("B.wav", "O.wav", "P.wav", 0.0);
        assert_eq!(info.vocal_track(false).unwrap(), Path::new("O.wav"));
        assert_eq!(info.vocal_track(true).unwrap(), Path::new("P.wav"));

        let info = TrackInfo::new("O.wav");
        match info.vocal_track(true) {
            Err(PreviewError::SourceUnreadable { .. }) => {}
            other => panic!("Expected SourceUnreadable, got: {:?}", other),
        }
    }

    #[test]
    fn test_validate_start_time() {
        assert!(TrackInfo::new("O.wav").validate().is_ok());
        assert!(TrackInfo::new("O.wav")
            .with_recording_start_time(-1.0)
            .validate()
            .is_err());
        assert!(TrackInfo::new("O.wav")
            .with_recording_start_time(f64::NAN)
            .validate()
            .is_err());
    }
}
