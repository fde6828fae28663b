//! Preview Audio - vocal/background preview and mix export
//!
//! A recorded vocal take (original and optionally a processed version) is
//! previewed over the background track it was recorded against, and a
//! window of the result can be bounced to a WAV file.
//!
//! # Architecture
//!
//! - [`PlaybackController`]: live preview with progress and completion handlers
//! - [`ExportController`]: asynchronous offline bounce, one at a time
//! - [`RenderEngine`]: the sample-level seam both controllers drive;
//!   [`WavRenderer`] renders WAV files, [`MockEngine`] has a manual clock
//!
//! Time is measured on the aligned timeline: vocal time, with the background
//! offset by [`TrackInfo::recording_start_time`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod player;
mod session;
mod sync;
pub mod track;

pub use config::PreviewConfig;
pub use engine::{MockEngine, RenderEngine, WavRenderer};
pub use error::{PreviewError, Result};
pub use export::{ExportCompletion, ExportConfiguration, ExportController, ExportReport};
pub use player::{PlaybackController, PlaybackState};
pub use track::TrackInfo;
