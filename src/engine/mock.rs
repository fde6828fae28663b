//! Mock render engine for testing
//!
//! Sources are registered by path with a duration instead of being decoded,
//! and the clock only moves when [`MockEngine::advance`] is called, so tests
//! control time exactly. Start, resume and render failures can be injected,
//! a render can be made to panic, and renders can be held open to exercise
//! overlapping exports.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::engine::{
    BounceRequest, BounceSummary, EngineError, EngineResult, RenderEngine, RenderGraph,
    SourceInfo, SourceSlot, INTERNAL_SAMPLE_RATE,
};
use crate::sync;

#[derive(Debug, Default)]
struct MockState {
    sources: HashMap<PathBuf, f64>,
    graph: Option<RenderGraph>,
    position: f64,
    running: bool,
    start_failure: Option<String>,
    resume_failure: Option<String>,
    render_failure: Option<EngineError>,
    render_panic: Option<String>,
    renders: Vec<BounceRequest>,
    release_count: usize,
}

/// Engine with a manually advanced clock
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
    renders_held: Mutex<bool>,
    render_gate: Condvar,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a readable source
    pub fn with_source(self, path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        self.add_source(path, duration_secs);
        self
    }

    pub fn add_source(&self, path: impl Into<PathBuf>, duration_secs: f64) {
        self.lock().sources.insert(path.into(), duration_secs);
    }

    /// Move the clock forward if running, stopping at the timeline end
    pub fn advance(&self, secs: f64) {
        let mut state = self.lock();
        if state.running {
            let end = state.graph.as_ref().map_or(0.0, |g| g.timeline_secs);
            state.position = (state.position + secs).min(end);
        }
    }

    pub fn set_start_failure(&self, reason: Option<&str>) {
        self.lock().start_failure = reason.map(str::to_string);
    }

    pub fn set_resume_failure(&self, reason: Option<&str>) {
        self.lock().resume_failure = reason.map(str::to_string);
    }

    pub fn set_render_failure(&self, failure: Option<EngineError>) {
        self.lock().render_failure = failure;
    }

    /// Make `render` panic with `message` after recording the request
    pub fn set_render_panic(&self, message: Option<&str>) {
        self.lock().render_panic = message.map(str::to_string);
    }

    /// Make `render` block until [`MockEngine::release_renders`]
    pub fn hold_renders(&self) {
        *self.lock_held() = true;
    }

    pub fn release_renders(&self) {
        *self.lock_held() = false;
        self.render_gate.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn graph(&self) -> Option<RenderGraph> {
        self.lock().graph.clone()
    }

    /// Live gain of `slot`, if wired
    pub fn gain(&self, slot: SourceSlot) -> Option<f32> {
        self.lock()
            .graph
            .as_ref()
            .and_then(|g| g.source(slot))
            .map(|s| s.gain)
    }

    /// Every bounce request received so far
    pub fn renders(&self) -> Vec<BounceRequest> {
        self.lock().renders.clone()
    }

    pub fn release_count(&self) -> usize {
        self.lock().release_count
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        sync::lock(&self.state)
    }

    fn lock_held(&self) -> MutexGuard<'_, bool> {
        sync::lock(&self.renders_held)
    }
}

impl RenderEngine for MockEngine {
    fn open_source(&self, path: &Path) -> EngineResult<SourceInfo> {
        let state = self.lock();
        let duration_secs = *state
            .sources
            .get(path)
            .ok_or_else(|| EngineError::Unreadable {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            })?;

        Ok(SourceInfo {
            path: path.to_path_buf(),
            duration_secs,
            sample_rate: INTERNAL_SAMPLE_RATE,
            channels: 2,
        })
    }

    fn configure(&self, graph: &RenderGraph) -> EngineResult<()> {
        let mut state = self.lock();
        if let Some(missing) = graph
            .sources
            .iter()
            .find(|s| !state.sources.contains_key(&s.path))
        {
            return Err(EngineError::Unreadable {
                path: missing.path.clone(),
                reason: "file not found".to_string(),
            });
        }
        state.graph = Some(graph.clone());
        state.position = 0.0;
        state.running = false;
        Ok(())
    }

    fn set_gain(&self, slot: SourceSlot, gain: f32) {
        if let Some(graph) = self.lock().graph.as_mut() {
            graph.set_gain(slot, gain);
        }
    }

    fn start(&self, position: f64) -> EngineResult<()> {
        let mut state = self.lock();
        if let Some(reason) = state.start_failure.clone() {
            return Err(EngineError::Unavailable { reason });
        }
        let end = state
            .graph
            .as_ref()
            .map(|g| g.timeline_secs)
            .ok_or(EngineError::NotConfigured)?;
        state.position = position.clamp(0.0, end);
        state.running = true;
        Ok(())
    }

    fn pause(&self) {
        self.lock().running = false;
    }

    fn resume(&self) -> EngineResult<()> {
        let mut state = self.lock();
        if let Some(reason) = state.resume_failure.clone() {
            return Err(EngineError::Unavailable { reason });
        }
        if state.graph.is_none() {
            return Err(EngineError::NotConfigured);
        }
        state.running = true;
        Ok(())
    }

    fn seek(&self, position: f64) -> EngineResult<()> {
        let mut state = self.lock();
        let end = state
            .graph
            .as_ref()
            .map(|g| g.timeline_secs)
            .ok_or(EngineError::NotConfigured)?;
        state.position = position.clamp(0.0, end);
        Ok(())
    }

    fn position(&self) -> f64 {
        self.lock().position
    }

    fn halt(&self) {
        self.lock().running = false;
    }

    fn release(&self) {
        let mut state = self.lock();
        state.graph = None;
        state.running = false;
        state.position = 0.0;
        state.release_count += 1;
    }

    fn render(&self, request: &BounceRequest) -> EngineResult<BounceSummary> {
        {
            let mut held = self.lock_held();
            while *held {
                held = self
                    .render_gate
                    .wait(held)
                    .unwrap_or_else(|e| e.into_inner());
            }
        }

        let mut state = self.lock();
        state.renders.push(request.clone());
        if let Some(message) = state.render_panic.clone() {
            drop(state);
            panic!("{}", message);
        }
        if let Some(failure) = state.render_failure.clone() {
            return Err(failure);
        }
        if let Some(missing) = request
            .graph
            .sources
            .iter()
            .find(|s| !state.sources.contains_key(&s.path))
        {
            return Err(EngineError::Unreadable {
                path: missing.path.clone(),
                reason: "file not found".to_string(),
            });
        }

        let sample_rate = request.format.sample_rate;
        let frames_written = (request.duration * sample_rate as f64).round() as u64;
        Ok(BounceSummary {
            frames_written,
            channels: 2,
            sample_rate,
            duration_secs: frames_written as f64 / sample_rate as f64,
        })
    }
}
