//! WAV-backed render engine
//!
//! Decodes sources with `hound` into memory (cached per path), keeps a
//! monotonic wall-clock time base for live preview, and mixes graph windows
//! either on demand (`mix_live`, for a host audio callback) or offline
//! (`render`, for export).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, info};

use crate::config::EngineConfig;
use crate::engine::buffer::{calculate_peak, seconds_to_frames, AudioBuffer, ChannelLayout};
use crate::engine::io::{export_audio, import_audio, probe_audio};
use crate::engine::{
    BounceRequest, BounceSummary, EngineError, EngineResult, RenderEngine, RenderGraph,
    SourceInfo, SourceSlot,
};
use crate::sync::lock;

/// Wall-clock time base. Advances only while anchored.
#[derive(Debug, Clone, Default)]
struct PlaybackClock {
    base: f64,
    anchor: Option<Instant>,
    end: f64,
}

impl PlaybackClock {
    fn position(&self) -> f64 {
        let elapsed = self.anchor.map_or(0.0, |a| a.elapsed().as_secs_f64());
        (self.base + elapsed).min(self.end)
    }

    fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    fn run_from(&mut self, position: f64) {
        self.base = position.clamp(0.0, self.end);
        self.anchor = Some(Instant::now());
    }

    fn freeze(&mut self) {
        self.base = self.position();
        self.anchor = None;
    }
}

#[derive(Debug, Default)]
struct LiveState {
    graph: Option<RenderGraph>,
    clock: PlaybackClock,
}

/// Render engine over in-memory decoded WAV sources
#[derive(Debug)]
pub struct WavRenderer {
    sample_rate: u32,
    sources: Mutex<HashMap<PathBuf, Arc<AudioBuffer>>>,
    live: Mutex<LiveState>,
}

impl Default for WavRenderer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl WavRenderer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            sources: Mutex::new(HashMap::new()),
            live: Mutex::new(LiveState::default()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mix `frames` of the live graph from the current position. Intended
    /// for a host audio callback; does not advance the clock.
    pub fn mix_live(&self, frames: usize) -> EngineResult<AudioBuffer> {
        let (graph, position) = {
            let live = self.lock_live();
            let graph = live.graph.clone().ok_or(EngineError::NotConfigured)?;
            (graph, live.clock.position())
        };
        self.mix_window(&graph, position, frames)
    }

    /// Mix `frames` of `graph` starting at timeline time `start`
    pub fn mix_window(
        &self,
        graph: &RenderGraph,
        start: f64,
        frames: usize,
    ) -> EngineResult<AudioBuffer> {
        let mut loaded = Vec::with_capacity(graph.sources.len());
        for source in &graph.sources {
            if source.slot == SourceSlot::Background && !graph.mix_mode.includes_background() {
                continue;
            }
            loaded.push((source, self.load(&source.path)?));
        }

        let layout = if loaded.iter().any(|(_, b)| b.num_channels() > 1) {
            ChannelLayout::Stereo
        } else {
            ChannelLayout::Mono
        };
        let mut out = AudioBuffer::new(frames, layout, self.sample_rate);

        for (source, buffer) in loaded {
            let source_start = seconds_to_frames(start + source.offset_secs, self.sample_rate);
            out.add_scaled(&buffer, source_start, source.gain);
        }

        Ok(out)
    }

    /// Decode `path`, reusing the cached buffer when present
    fn load(&self, path: &Path) -> EngineResult<Arc<AudioBuffer>> {
        if let Some(buffer) = self.lock_sources().get(path) {
            return Ok(Arc::clone(buffer));
        }

        let buffer = Arc::new(import_audio(path, self.sample_rate)?);
        debug!(
            "[WAV] Decoded {} ({:.3}s, {} ch)",
            path.display(),
            buffer.duration_secs(),
            buffer.num_channels()
        );
        self.lock_sources()
            .insert(path.to_path_buf(), Arc::clone(&buffer));
        Ok(buffer)
    }

    fn lock_sources(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<AudioBuffer>>> {
        lock(&self.sources)
    }

    fn lock_live(&self) -> MutexGuard<'_, LiveState> {
        lock(&self.live)
    }
}

impl RenderEngine for WavRenderer {
    fn open_source(&self, path: &Path) -> EngineResult<SourceInfo> {
        let info = probe_audio(path)?;
        self.load(path)?;
        Ok(info)
    }

    fn configure(&self, graph: &RenderGraph) -> EngineResult<()> {
        for source in &graph.sources {
            self.load(&source.path)?;
        }
        let mut live = self.lock_live();
        live.graph = Some(graph.clone());
        live.clock = PlaybackClock {
            end: graph.timeline_secs,
            ..PlaybackClock::default()
        };
        debug!(
            "[WAV] Graph configured: {:?}, {} sources, {:.3}s",
            graph.mix_mode,
            graph.sources.len(),
            graph.timeline_secs
        );
        Ok(())
    }

    fn set_gain(&self, slot: SourceSlot, gain: f32) {
        if let Some(graph) = self.lock_live().graph.as_mut() {
            graph.set_gain(slot, gain);
        }
    }

    fn start(&self, position: f64) -> EngineResult<()> {
        let mut live = self.lock_live();
        if live.graph.is_none() {
            return Err(EngineError::NotConfigured);
        }
        live.clock.run_from(position);
        Ok(())
    }

    fn pause(&self) {
        self.lock_live().clock.freeze();
    }

    fn resume(&self) -> EngineResult<()> {
        let mut live = self.lock_live();
        if live.graph.is_none() {
            return Err(EngineError::NotConfigured);
        }
        if !live.clock.is_running() {
            let position = live.clock.base;
            live.clock.run_from(position);
        }
        Ok(())
    }

    fn seek(&self, position: f64) -> EngineResult<()> {
        let mut live = self.lock_live();
        if live.graph.is_none() {
            return Err(EngineError::NotConfigured);
        }
        if live.clock.is_running() {
            live.clock.run_from(position);
        } else {
            live.clock.base = position.clamp(0.0, live.clock.end);
        }
        Ok(())
    }

    fn position(&self) -> f64 {
        self.lock_live().clock.position()
    }

    fn halt(&self) {
        self.lock_live().clock.freeze();
    }

    fn release(&self) {
        *self.lock_live() = LiveState::default();
        self.lock_sources().clear();
    }

    fn render(&self, request: &BounceRequest) -> EngineResult<BounceSummary> {
        let frames = seconds_to_frames(request.duration, self.sample_rate).max(0) as usize;
        let mut mix = self.mix_window(&request.graph, request.start_time, frames)?;

        if !mix.is_finite() {
            return Err(EngineError::Render {
                reason: "mix produced non-finite samples".to_string(),
            });
        }
        debug!("[WAV] Bounce peak {:.1} dBFS", calculate_peak(&mix));
        mix.clamp();

        let frames_written = export_audio(&mix, &request.output_file, request.format)?;
        info!(
            "[WAV] Bounced {:.3}s to {}",
            request.duration,
            request.output_file.display()
        );

        Ok(BounceSummary {
            frames_written,
            channels: mix.num_channels() as u16,
            sample_rate: request.format.sample_rate,
            duration_secs: frames_written as f64 / request.format.sample_rate as f64,
        })
    }
}
