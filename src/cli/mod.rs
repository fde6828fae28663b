//! CLI Module
//!
//! Command-line interface for inspecting, previewing and exporting a
//! vocal recording against its background.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::track::TrackInfo;

/// Preview Audio - vocal/background preview and mix export
#[derive(Parser, Debug)]
#[command(name = "preview-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show durations and the aligned timeline
    #[command(name = "inspect")]
    Inspect {
        #[command(flatten)]
        tracks: TrackArgs,
    },

    /// Run a preview, printing the playhead
    #[command(name = "play")]
    Play {
        #[command(flatten)]
        tracks: TrackArgs,

        #[command(flatten)]
        mix: MixArgs,
    },

    /// Bounce a window to a WAV file
    #[command(name = "export")]
    Export {
        #[command(flatten)]
        tracks: TrackArgs,

        #[command(flatten)]
        mix: MixArgs,

        /// Output file (default: mixed_<timestamp>.wav in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// The tracks of one recording
#[derive(Args, Debug, Clone)]
pub struct TrackArgs {
    /// Original vocal take
    #[arg(long)]
    pub vocal: PathBuf,

    /// Processed vocal take
    #[arg(long)]
    pub processed_vocal: Option<PathBuf>,

    /// Background track the vocal was recorded against
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Background position where the recording started, in seconds
    #[arg(long, default_value_t = 0.0)]
    pub recording_start: f64,
}

impl TrackArgs {
    pub fn track_info(&self) -> TrackInfo {
        let mut info =
            TrackInfo::new(&self.vocal).with_recording_start_time(self.recording_start);
        if let Some(path) = &self.background {
            info = info.with_background_track(path);
        }
        if let Some(path) = &self.processed_vocal {
            info = info.with_processed_vocal_track(path);
        }
        info
    }
}

/// Window, gains and routing
#[derive(Args, Debug, Clone)]
pub struct MixArgs {
    /// Window start on the aligned timeline, in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Window length in seconds (0 = to the end)
    #[arg(long, default_value_t = 0.0)]
    pub duration: f64,

    /// Vocal gain (default from config)
    #[arg(long)]
    pub vocal_volume: Option<f32>,

    /// Background gain (default from config)
    #[arg(long)]
    pub background_volume: Option<f32>,

    /// Use the processed vocal take
    #[arg(long)]
    pub processed: bool,

    /// Vocal only, without the background
    #[arg(long)]
    pub no_mix: bool,
}

impl MixArgs {
    pub fn should_mix_audio(&self) -> bool {
        !self.no_mix
    }
}
