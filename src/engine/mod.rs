//! Render Engine Module
//!
//! The controllers drive sample-level work through [`RenderEngine`]:
//! - Source opening and metadata
//! - Graph configuration and per-source gains
//! - A live time base (start/pause/resume/seek)
//! - Offline bounce to a file
//!
//! Two implementations ship with the crate: [`WavRenderer`] over WAV files
//! and [`MockEngine`] with a manually driven clock.

pub mod buffer;
pub mod io;
pub mod mock;
pub mod wav;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use buffer::{AudioBuffer, ChannelLayout, INTERNAL_SAMPLE_RATE};
pub use io::{export_audio, generate_test_tone, import_audio, probe_audio, ExportFormat};
pub use mock::MockEngine;
pub use wav::WavRenderer;

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures reported by a render engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("no render graph configured")]
    NotConfigured,

    #[error("cannot write {path}: {reason}")]
    Output { path: PathBuf, reason: String },

    #[error("render failed: {reason}")]
    Render { reason: String },
}

/// One of the three inputs of a preview graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSlot {
    Background,
    OriginalVocal,
    ProcessedVocal,
}

impl fmt::Display for SourceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSlot::Background => write!(f, "background"),
            SourceSlot::OriginalVocal => write!(f, "original vocal"),
            SourceSlot::ProcessedVocal => write!(f, "processed vocal"),
        }
    }
}

/// Whether vocal and background are summed or the vocal plays alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    #[default]
    Mixed,
    VocalOnly,
}

impl MixMode {
    pub fn from_should_mix(should_mix_audio: bool) -> Self {
        if should_mix_audio {
            MixMode::Mixed
        } else {
            MixMode::VocalOnly
        }
    }

    pub fn includes_background(&self) -> bool {
        matches!(self, MixMode::Mixed)
    }
}

/// Metadata of an opened source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A source wired into the graph with its gain
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSource {
    pub slot: SourceSlot,
    pub path: PathBuf,
    pub gain: f32,
    /// Offset added to timeline time to get the position in this source
    pub offset_secs: f64,
}

/// Sources and routing for playback or a bounce
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderGraph {
    pub mix_mode: MixMode,
    pub sources: Vec<GraphSource>,
    /// Length of the aligned timeline in seconds
    pub timeline_secs: f64,
}

impl RenderGraph {
    pub fn source(&self, slot: SourceSlot) -> Option<&GraphSource> {
        self.sources.iter().find(|s| s.slot == slot)
    }

    pub fn set_gain(&mut self, slot: SourceSlot, gain: f32) {
        if let Some(source) = self.sources.iter_mut().find(|s| s.slot == slot) {
            source.gain = gain;
        }
    }
}

/// Offline render request
#[derive(Debug, Clone, PartialEq)]
pub struct BounceRequest {
    pub graph: RenderGraph,
    pub start_time: f64,
    pub duration: f64,
    pub output_file: PathBuf,
    pub format: ExportFormat,
}

/// Outcome of a completed bounce
#[derive(Debug, Clone, PartialEq)]
pub struct BounceSummary {
    pub frames_written: u64,
    pub channels: u16,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Capabilities the controllers need from an audio engine.
///
/// Positions are seconds on the aligned timeline. Implementations must be
/// shareable across threads: the progress ticker reads `position` while the
/// owner issues control calls, and bounces run on a worker thread.
pub trait RenderEngine: Send + Sync {
    /// Open a source and read its metadata
    fn open_source(&self, path: &Path) -> EngineResult<SourceInfo>;

    /// Replace the live graph
    fn configure(&self, graph: &RenderGraph) -> EngineResult<()>;

    /// Change the live gain of one source
    fn set_gain(&self, slot: SourceSlot, gain: f32);

    /// Begin playback at `position`
    fn start(&self, position: f64) -> EngineResult<()>;

    /// Freeze the time base, keeping resources
    fn pause(&self);

    fn resume(&self) -> EngineResult<()>;

    fn seek(&self, position: f64) -> EngineResult<()>;

    /// Current playback position
    fn position(&self) -> f64;

    /// Stop playback, keeping the graph
    fn halt(&self);

    /// Stop playback and drop the live graph and any decoded sources
    fn release(&self);

    /// Render a window of `request.graph` to `request.output_file`. Blocks
    /// until the file is written.
    fn render(&self, request: &BounceRequest) -> EngineResult<BounceSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_mode_from_flag() {
        assert_eq!(MixMode::from_should_mix(true), MixMode::Mixed);
        assert_eq!(MixMode::from_should_mix(false), MixMode::VocalOnly);
        assert!(!MixMode::VocalOnly.includes_background());
    }

    #[test]
    fn test_graph_set_gain() {
        let mut graph = RenderGraph {
            mix_mode: MixMode::Mixed,
            sources: vec![GraphSource {
                slot: SourceSlot::OriginalVocal,
                path: PathBuf::from("O.wav"),
                gain: 1.0,
                offset_secs: 0.0,
            }],
            timeline_secs: 4.0,
        };
        graph.set_gain(SourceSlot::OriginalVocal, 0.25);
        graph.set_gain(SourceSlot::Background, 0.5);
        assert_eq!(graph.source(SourceSlot::OriginalVocal).unwrap().gain, 0.25);
        assert!(graph.source(SourceSlot::Background).is_none());
    }
}
