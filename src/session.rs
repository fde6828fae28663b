//! Shared `prepare` step for the player and the exporter
//!
//! Opening sources, resolving the vocal take, measuring durations and
//! building a render graph are identical for live preview and export, so
//! both controllers hold a [`PreparedSession`].

use std::path::Path;

use log::debug;

use crate::engine::{
    EngineError, GraphSource, MixMode, RenderEngine, RenderGraph, SourceInfo, SourceSlot,
};
use crate::error::{PreviewError, Result};
use crate::track::TrackInfo;

/// Linear gains for the two audible channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volumes {
    pub vocal: f32,
    pub background: f32,
}

impl Volumes {
    /// Negative or non-finite gains are treated as silence
    pub fn new(vocal: f32, background: f32) -> Self {
        Self {
            vocal: sanitize_gain(vocal),
            background: sanitize_gain(background),
        }
    }
}

pub(crate) fn sanitize_gain(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.max(0.0)
    } else {
        0.0
    }
}

/// Sources opened and measured for one [`TrackInfo`]
#[derive(Debug, Clone)]
pub(crate) struct PreparedSession {
    pub track_info: TrackInfo,
    pub mix_mode: MixMode,
    pub original_vocal: SourceInfo,
    pub processed_vocal: Option<SourceInfo>,
    pub background: Option<SourceInfo>,
}

impl PreparedSession {
    /// Validate `track_info` and open every present source
    ///
    /// # Errors
    /// * `ConfigurationInvalid` - bad recording start, or mixing without a
    ///   background (or with a recording start past its end)
    /// * `SourceUnreadable` - a source cannot be opened, or the processed
    ///   vocal is selected but absent
    pub fn open(
        engine: &dyn RenderEngine,
        track_info: &TrackInfo,
        mix_mode: MixMode,
        use_processed: bool,
    ) -> Result<Self> {
        track_info.validate()?;

        if mix_mode.includes_background() && track_info.background_track().is_none() {
            return Err(PreviewError::invalid_config(
                "mixing audio requires a background track",
            ));
        }
        track_info.vocal_track(use_processed)?;

        let original_vocal = open_source(engine, track_info.original_vocal_track())?;
        let processed_vocal = track_info
            .processed_vocal_track()
            .map(|path| open_source(engine, path))
            .transpose()?;
        let background = track_info
            .background_track()
            .map(|path| open_source(engine, path))
            .transpose()?;

        let session = Self {
            track_info: track_info.clone(),
            mix_mode,
            original_vocal,
            processed_vocal,
            background,
        };
        session.check_alignment(mix_mode)?;

        debug!(
            "[SESSION] Prepared {:?}: vocal {:.3}s, background {:.3}s, offset {:.3}s",
            mix_mode,
            session.vocal_duration(use_processed),
            session.background_duration(),
            track_info.recording_start_time()
        );

        Ok(session)
    }

    /// Duration of the selected vocal take
    pub fn vocal_duration(&self, use_processed: bool) -> f64 {
        match (use_processed, &self.processed_vocal) {
            (true, Some(processed)) => processed.duration_secs,
            _ => self.original_vocal.duration_secs,
        }
    }

    pub fn background_duration(&self) -> f64 {
        self.background.as_ref().map_or(0.0, |b| b.duration_secs)
    }

    pub fn has_processed_vocal(&self) -> bool {
        self.processed_vocal.is_some()
    }

    /// Length of the aligned timeline for `mix_mode`
    ///
    /// Mixed previews run to the end of the background; vocal-only previews
    /// run to the end of the longer vocal take.
    pub fn timeline_secs(&self, mix_mode: MixMode) -> f64 {
        match mix_mode {
            MixMode::Mixed => {
                (self.background_duration() - self.track_info.recording_start_time()).max(0.0)
            }
            MixMode::VocalOnly => self
                .processed_vocal
                .as_ref()
                .map_or(0.0, |p| p.duration_secs)
                .max(self.original_vocal.duration_secs),
        }
    }

    /// Fail with `ConfigurationInvalid` if `mix_mode` cannot be rendered
    pub fn check_alignment(&self, mix_mode: MixMode) -> Result<()> {
        if !mix_mode.includes_background() {
            return Ok(());
        }
        let background = self.background.as_ref().ok_or_else(|| {
            PreviewError::invalid_config("mixing audio requires a background track")
        })?;
        if self.track_info.recording_start_time() >= background.duration_secs {
            return Err(PreviewError::invalid_config(format!(
                "recording start {:.3}s is past the end of the background track ({:.3}s)",
                self.track_info.recording_start_time(),
                background.duration_secs
            )));
        }
        Ok(())
    }

    /// Build the graph for `mix_mode`. Both vocal takes are wired when
    /// present; the unselected one is silent so takes can be swapped live
    /// by changing gains.
    pub fn graph(&self, mix_mode: MixMode, volumes: Volumes, use_processed: bool) -> RenderGraph {
        let mut sources = Vec::with_capacity(3);

        if mix_mode.includes_background() {
            if let Some(background) = &self.background {
                sources.push(GraphSource {
                    slot: SourceSlot::Background,
                    path: background.path.clone(),
                    gain: volumes.background,
                    offset_secs: self.track_info.recording_start_time(),
                });
            }
        }

        let processed_selected = use_processed && self.processed_vocal.is_some();
        sources.push(GraphSource {
            slot: SourceSlot::OriginalVocal,
            path: self.original_vocal.path.clone(),
            gain: if processed_selected { 0.0 } else { volumes.vocal },
            offset_secs: 0.0,
        });
        if let Some(processed) = &self.processed_vocal {
            sources.push(GraphSource {
                slot: SourceSlot::ProcessedVocal,
                path: processed.path.clone(),
                gain: if processed_selected { volumes.vocal } else { 0.0 },
                offset_secs: 0.0,
            });
        }

        RenderGraph {
            mix_mode,
            sources,
            timeline_secs: self.timeline_secs(mix_mode),
        }
    }
}

fn open_source(engine: &dyn RenderEngine, path: &Path) -> Result<SourceInfo> {
    engine.open_source(path).map_err(source_error)
}

/// Map an engine failure while opening or wiring sources
pub(crate) fn source_error(err: EngineError) -> PreviewError {
    match err {
        EngineError::Unreadable { path, reason } => PreviewError::SourceUnreadable { path, reason },
        other => PreviewError::invalid_config(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn engine() -> MockEngine {
        MockEngine::new()
            .with_source("B.wav", 10.0)
            .with_source("O.wav", 6.0)
            .with_source("P.wav", 7.0)
    }

    fn info() -> TrackInfo {
        TrackInfo::from_paths("B.wav", "O.wav", "P.wav", 2.0)
    }

    #[test]
    fn test_open_measures_sources() {
        let session = PreparedSession::open(&engine(), &info(), MixMode::Mixed, false).unwrap();
        assert_eq!(session.vocal_duration(false), 6.0);
        assert_eq!(session.vocal_duration(true), 7.0);
        assert_eq!(session.background_duration(), 10.0);
        assert_eq!(session.timeline_secs(MixMode::Mixed), 8.0);
        assert_eq!(session.timeline_secs(MixMode::VocalOnly), 7.0);
    }

    #[test]
    fn test_mixing_without_background_is_invalid() {
        let info = TrackInfo::new("O.wav");
        let err = PreparedSession::open(&engine(), &info, MixMode::Mixed, false).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_INVALID");

        assert!(PreparedSession::open(&engine(), &info, MixMode::VocalOnly, false).is_ok());
    }

    #[test]
    fn test_recording_start_past_background_end() {
        let info = info().with_recording_start_time(10.0);
        let err = PreparedSession::open(&engine(), &info, MixMode::Mixed, false).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_INVALID");
    }

    #[test]
    fn test_unreadable_source() {
        let info = TrackInfo::from_paths("B.wav", "missing.wav", "P.wav", 0.0);
        match PreparedSession::open(&engine(), &info, MixMode::Mixed, false) {
            Err(PreviewError::SourceUnreadable { path, .. }) => {
                assert_eq!(path, Path::new("missing.wav"));
            }
            other => panic!("Expected SourceUnreadable, got: {:?}", other),
        }
    }

    #[test]
    fn test_graph_silences_unselected_take() {
        let session = PreparedSession::open(&engine(), &info(), MixMode::Mixed, true).unwrap();
        let graph = session.graph(MixMode::Mixed, Volumes::new(0.8, 0.5), true);

        let background = graph.source(SourceSlot::Background).unwrap();
        assert_eq!(background.gain, 0.5);
        assert_eq!(background.offset_secs, 2.0);
        assert_eq!(graph.source(SourceSlot::OriginalVocal).unwrap().gain, 0.0);
        assert_eq!(graph.source(SourceSlot::ProcessedVocal).unwrap().gain, 0.8);

        let graph = session.graph(MixMode::VocalOnly, Volumes::new(0.8, 0.5), false);
        assert!(graph.source(SourceSlot::Background).is_none());
        assert_eq!(graph.source(SourceSlot::OriginalVocal).unwrap().gain, 0.8);
    }

    #[test]
    fn test_volumes_sanitized() {
        let volumes = Volumes::new(-1.0, f32::NAN);
        assert_eq!(volumes.vocal, 0.0);
        assert_eq!(volumes.background, 0.0);
        assert_eq!(Volumes::new(1.5, 0.25).vocal, 1.5);
    }
}
