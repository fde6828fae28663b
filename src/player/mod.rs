//! Live preview of a vocal take over its background track
//!
//! [`PlaybackController`] drives a [`RenderEngine`] through the
//! [`Transport`] state machine and reports progress from a background
//! ticker (see `progress`). All methods take `&self`; the controller can be
//! shared across threads and called from inside its own handlers.

mod progress;
pub mod transport;

pub use transport::{PlaybackState, Transport};

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::engine::{MixMode, RenderEngine};
use crate::error::{PreviewError, Result};
use crate::session::{source_error, PreparedSession, Volumes};
use crate::sync::lock;
use crate::track::TrackInfo;

/// Called with the playhead position, in seconds, on every tick
pub type ProgressHandler = Box<dyn FnMut(f64) + Send>;

/// Called once when the window plays out, with the background track path
pub type FinishedHandler = Box<dyn FnMut(Option<&Path>) + Send>;

struct Inner {
    transport: Transport,
    session: Option<PreparedSession>,
    volumes: Volumes,
    use_processed: bool,
    progress_handler: Option<ProgressHandler>,
    progress_epoch: u64,
    finished_handler: Option<FinishedHandler>,
    finished_epoch: u64,
    ticker: Option<Sender<()>>,
    /// Bumped whenever the running ticker is retired
    generation: u64,
}

impl Inner {
    fn stop_ticker(&mut self) {
        self.ticker = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Engine holds a configured graph
    fn holds_graph(&self) -> bool {
        matches!(
            self.transport.state(),
            PlaybackState::Prepared | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Serializes handler delivery against control calls
    delivery: Mutex<()>,
}

impl Shared {
    fn deliver_progress(&self, position: f64) {
        let (handler, epoch) = {
            let mut inner = lock(&self.inner);
            (inner.progress_handler.take(), inner.progress_epoch)
        };
        if let Some(mut handler) = handler {
            handler(position);
            let mut inner = lock(&self.inner);
            if inner.progress_epoch == epoch {
                inner.progress_handler = Some(handler);
            }
        }
    }

    fn deliver_finished(&self, background: Option<&Path>) {
        let (handler, epoch) = {
            let mut inner = lock(&self.inner);
            (inner.finished_handler.take(), inner.finished_epoch)
        };
        if let Some(mut handler) = handler {
            handler(background);
            let mut inner = lock(&self.inner);
            if inner.finished_epoch == epoch {
                inner.finished_handler = Some(handler);
            }
        }
    }
}

/// Preview player for one vocal recording
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use preview_audio::{PlaybackController, TrackInfo, WavRenderer};
///
/// let player = PlaybackController::new(Arc::new(WavRenderer::default()));
/// player.set_progress_handler(|t| println!("{:.2}s", t));
///
/// let info = TrackInfo::from_paths("beat.wav", "take.wav", "take_fx.wav", 1.5);
/// player.prepare(&info, true)?;
/// player.start()?;
/// # Ok::<(), preview_audio::PreviewError>(())
/// ```
pub struct PlaybackController {
    engine: Arc<dyn RenderEngine>,
    shared: Arc<Shared>,
    config: PlaybackConfig,
}

impl PlaybackController {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self::with_config(engine, PlaybackConfig::default())
    }

    pub fn with_config(engine: Arc<dyn RenderEngine>, config: PlaybackConfig) -> Self {
        let inner = Inner {
            transport: Transport::new(),
            session: None,
            volumes: Volumes::new(config.vocal_volume, config.background_volume),
            use_processed: false,
            progress_handler: None,
            progress_epoch: 0,
            finished_handler: None,
            finished_epoch: 0,
            ticker: None,
            generation: 0,
        };
        Self {
            engine,
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                delivery: Mutex::new(()),
            }),
            config,
        }
    }

    /// Run `f` with the delivery gate held, unless this thread is already
    /// inside one of this controller's handlers.
    fn control<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let _gate = if progress::is_delivering(&self.shared) {
            None
        } else {
            Some(lock(&self.shared.delivery))
        };
        let mut inner = lock(&self.shared.inner);
        f(&mut inner)
    }

    fn inspect<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        f(&lock(&self.shared.inner))
    }

    fn spawn_ticker(&self, inner: &mut Inner) -> std::io::Result<()> {
        inner.stop_ticker();
        let sender = progress::spawn(
            Arc::clone(&self.shared),
            Arc::clone(&self.engine),
            inner.generation,
            self.config.tick_interval(),
        )?;
        inner.ticker = Some(sender);
        Ok(())
    }

    fn apply_gains(&self, inner: &Inner) {
        if !inner.holds_graph() {
            return;
        }
        if let Some(session) = &inner.session {
            let graph = session.graph(session.mix_mode, inner.volumes, inner.use_processed);
            for source in &graph.sources {
                self.engine.set_gain(source.slot, source.gain);
            }
        }
    }

    fn sync_engine_position(&self, inner: &Inner) {
        if !inner.transport.is_active() {
            return;
        }
        if let Err(e) = self.engine.seek(inner.transport.current_time()) {
            warn!("[PLAYER] Engine seek failed: {}", e);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load and align the tracks in `track_info`
    ///
    /// With `should_mix_audio` the background is played under the vocal,
    /// shifted by the recording start; otherwise only the vocal is heard.
    /// A player that is already playing is torn down first.
    ///
    /// # Errors
    /// * `SourceUnreadable` - a track cannot be opened, or the processed take
    ///   is selected but absent
    /// * `ConfigurationInvalid` - bad recording start or missing background
    pub fn prepare(&self, track_info: &TrackInfo, should_mix_audio: bool) -> Result<()> {
        let mix_mode = MixMode::from_should_mix(should_mix_audio);

        self.control(|inner| {
            inner.stop_ticker();
            let held_graph = inner.holds_graph();
            if inner.transport.is_active() {
                self.engine.halt();
            }
            inner.session = None;

            let volumes = inner.volumes;
            let use_processed = inner.use_processed;
            let opened = PreparedSession::open(
                self.engine.as_ref(),
                track_info,
                mix_mode,
                use_processed,
            )
            .and_then(|session| {
                let graph = session.graph(mix_mode, volumes, use_processed);
                self.engine.configure(&graph).map_err(source_error)?;
                Ok((session, graph.timeline_secs))
            });

            match opened {
                Ok((session, timeline_secs)) => {
                    inner.session = Some(session);
                    inner.transport.prepared(timeline_secs);
                    info!(
                        "[PLAYER] Prepared {:?} preview, timeline {:.3}s",
                        mix_mode, timeline_secs
                    );
                    Ok(())
                }
                Err(err) => {
                    if held_graph {
                        self.engine.release();
                    }
                    inner.transport.reset();
                    warn!("[PLAYER] Prepare failed: {}", err);
                    Err(err)
                }
            }
        })
    }

    /// Begin playback from the current playhead
    ///
    /// # Errors
    /// * `InvalidState` - not `Prepared` or `Paused`
    /// * `EngineStartFailure` - the engine refused to start
    pub fn start(&self) -> Result<()> {
        self.control(|inner| {
            inner.transport.check_can_start()?;

            let from = inner.transport.current_time();
            self.engine
                .start(from)
                .map_err(|e| PreviewError::EngineStartFailure {
                    reason: e.to_string(),
                })?;

            if let Err(e) = self.spawn_ticker(inner) {
                self.engine.halt();
                return Err(PreviewError::EngineStartFailure {
                    reason: format!("cannot spawn progress thread: {}", e),
                });
            }

            inner.transport.play()?;
            info!("[PLAYER] Playing from {:.3}s", from);
            Ok(())
        })
    }

    /// Seek to `seconds`, then start
    pub fn play_at(&self, seconds: f64) -> Result<()> {
        self.set_current_time(seconds);
        self.start()
    }

    /// Freeze the playhead. No-op unless playing.
    pub fn pause(&self) {
        self.control(|inner| {
            if !inner.transport.is_playing() {
                debug!("[PLAYER] Pause ignored while {}", inner.transport.state());
                return;
            }
            self.engine.pause();
            inner.transport.advance_to(self.engine.position());
            inner.transport.pause();
            inner.stop_ticker();
            info!("[PLAYER] Paused at {:.3}s", inner.transport.current_time());
        })
    }

    /// Continue from the paused position
    ///
    /// # Errors
    /// * `InvalidState` - not paused
    /// * `EngineResumeFailure` - the engine refused to resume
    pub fn unpause(&self) -> Result<()> {
        self.control(|inner| {
            inner.transport.check_can_resume()?;

            self.engine
                .resume()
                .map_err(|e| PreviewError::EngineResumeFailure {
                    reason: e.to_string(),
                })?;

            if let Err(e) = self.spawn_ticker(inner) {
                self.engine.pause();
                return Err(PreviewError::EngineResumeFailure {
                    reason: format!("cannot spawn progress thread: {}", e),
                });
            }

            inner.transport.resume()?;
            info!("[PLAYER] Resumed at {:.3}s", inner.transport.current_time());
            Ok(())
        })
    }

    /// Halt playback and release engine resources
    ///
    /// Safe in any state and idempotent. No handler runs after this returns.
    /// Call `prepare` again to play.
    pub fn stop(&self) {
        self.control(|inner| {
            inner.stop_ticker();
            if inner.holds_graph() {
                self.engine.halt();
                self.engine.release();
                info!("[PLAYER] Stopped");
            }
            inner.transport.stop();
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.inspect(|inner| inner.transport.state())
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    // ========================================================================
    // Playhead and window
    // ========================================================================

    /// Playhead position in timeline seconds
    pub fn current_time(&self) -> f64 {
        let mut inner = lock(&self.shared.inner);
        if inner.transport.is_playing() {
            inner.transport.advance_to(self.engine.position());
        }
        inner.transport.current_time()
    }

    /// Seek, clamped to the active window
    pub fn set_current_time(&self, seconds: f64) {
        self.control(|inner| {
            inner.transport.set_current_time(seconds);
            self.sync_engine_position(inner);
        })
    }

    /// Seek relative to the playhead
    pub fn seek_by(&self, offset_secs: f64) {
        self.control(|inner| {
            if inner.transport.is_playing() {
                inner.transport.advance_to(self.engine.position());
            }
            let target = inner.transport.current_time() + offset_secs;
            inner.transport.set_current_time(target);
            self.sync_engine_position(inner);
        })
    }

    pub fn playback_start_time(&self) -> f64 {
        self.inspect(|inner| inner.transport.playback_start_time())
    }

    pub fn set_playback_start_time(&self, seconds: f64) {
        self.control(|inner| {
            inner.transport.set_playback_start_time(seconds);
            self.sync_engine_position(inner);
        })
    }

    /// Window length; 0 plays to the end of the timeline
    pub fn playback_duration(&self) -> f64 {
        self.inspect(|inner| inner.transport.playback_duration())
    }

    pub fn set_playback_duration(&self, seconds: f64) {
        self.control(|inner| {
            inner.transport.set_playback_duration(seconds);
            self.sync_engine_position(inner);
        })
    }

    /// Set the window and move the playhead to its start
    pub fn set_preview_window(&self, start_secs: f64, duration_secs: f64) {
        self.control(|inner| {
            inner.transport.set_playback_start_time(start_secs);
            inner.transport.set_playback_duration(duration_secs);
            let start = inner.transport.playback_start_time();
            inner.transport.set_current_time(start);
            self.sync_engine_position(inner);
        })
    }

    /// Aligned timeline length, known once prepared
    pub fn timeline_duration(&self) -> Option<f64> {
        self.inspect(|inner| inner.transport.timeline_secs())
    }

    // ========================================================================
    // Mix
    // ========================================================================

    pub fn vocal_audio_track_volume(&self) -> f32 {
        self.inspect(|inner| inner.volumes.vocal)
    }

    pub fn set_vocal_audio_track_volume(&self, volume: f32) {
        self.control(|inner| {
            inner.volumes = Volumes::new(volume, inner.volumes.background);
            self.apply_gains(inner);
        })
    }

    pub fn background_audio_track_volume(&self) -> f32 {
        self.inspect(|inner| inner.volumes.background)
    }

    pub fn set_background_audio_track_volume(&self, volume: f32) {
        self.control(|inner| {
            inner.volumes = Volumes::new(inner.volumes.vocal, volume);
            self.apply_gains(inner);
        })
    }

    pub fn set_volumes(&self, vocal: f32, background: f32) {
        self.control(|inner| {
            inner.volumes = Volumes::new(vocal, background);
            self.apply_gains(inner);
        })
    }

    pub fn should_use_processed_vocal_track(&self) -> bool {
        self.inspect(|inner| inner.use_processed)
    }

    /// Switch between the original and processed vocal take
    ///
    /// Takes effect immediately during playback.
    ///
    /// # Errors
    /// * `SourceUnreadable` - the processed take was requested but the
    ///   prepared tracks have none
    pub fn set_should_use_processed_vocal_track(&self, use_processed: bool) -> Result<()> {
        self.control(|inner| {
            if let Some(session) = &inner.session {
                if use_processed && !session.has_processed_vocal() {
                    return Err(PreviewError::SourceUnreadable {
                        path: PathBuf::new(),
                        reason: "no processed vocal track was provided".to_string(),
                    });
                }
            }
            inner.use_processed = use_processed;
            self.apply_gains(inner);
            debug!(
                "[PLAYER] Using {} vocal",
                if use_processed { "processed" } else { "original" }
            );
            Ok(())
        })
    }

    /// Path of the vocal take that is audible, once prepared
    pub fn selected_vocal_track(&self) -> Option<PathBuf> {
        self.inspect(|inner| {
            inner.session.as_ref().and_then(|s| {
                s.track_info
                    .vocal_track(inner.use_processed)
                    .ok()
                    .map(Path::to_path_buf)
            })
        })
    }

    /// Duration of the selected vocal take; 0 before prepare
    pub fn vocal_audio_track_duration(&self) -> f64 {
        self.inspect(|inner| {
            inner
                .session
                .as_ref()
                .map_or(0.0, |s| s.vocal_duration(inner.use_processed))
        })
    }

    /// Duration of the background track; 0 when absent or not prepared
    pub fn background_audio_track_duration(&self) -> f64 {
        self.inspect(|inner| inner.session.as_ref().map_or(0.0, |s| s.background_duration()))
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    pub fn set_progress_handler<F>(&self, handler: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        let mut inner = lock(&self.shared.inner);
        inner.progress_handler = Some(Box::new(handler));
        inner.progress_epoch = inner.progress_epoch.wrapping_add(1);
    }

    pub fn clear_progress_handler(&self) {
        let mut inner = lock(&self.shared.inner);
        inner.progress_handler = None;
        inner.progress_epoch = inner.progress_epoch.wrapping_add(1);
    }

    pub fn set_playback_finished_handler<F>(&self, handler: F)
    where
        F: FnMut(Option<&Path>) + Send + 'static,
    {
        let mut inner = lock(&self.shared.inner);
        inner.finished_handler = Some(Box::new(handler));
        inner.finished_epoch = inner.finished_epoch.wrapping_add(1);
    }

    pub fn clear_playback_finished_handler(&self) {
        let mut inner = lock(&self.shared.inner);
        inner.finished_handler = None;
        inner.finished_epoch = inner.finished_epoch.wrapping_add(1);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockEngine, SourceSlot};
    use std::sync::mpsc;
    use std::time::Duration;

    fn engine() -> Arc<MockEngine> {
        Arc::new(
            MockEngine::new()
                .with_source("B.wav", 10.0)
                .with_source("O.wav", 6.0)
                .with_source("P.wav", 7.0),
        )
    }

    fn fast_config() -> PlaybackConfig {
        PlaybackConfig {
            progress_updates_per_second: 200.0,
            ..PlaybackConfig::default()
        }
    }

    fn info() -> TrackInfo {
        TrackInfo::from_paths("B.wav", "O.wav", "P.wav", 2.0)
    }

    #[test]
    fn test_prepare_reports_durations() {
        let engine = engine();
        let player = PlaybackController::new(engine.clone());
        assert_eq!(player.vocal_audio_track_duration(), 0.0);
        assert!(player.selected_vocal_track().is_none());

        player.prepare(&info(), true).unwrap();
        assert_eq!(player.state(), PlaybackState::Prepared);
        assert_eq!(player.vocal_audio_track_duration(), 6.0);
        assert_eq!(player.background_audio_track_duration(), 10.0);
        assert_eq!(player.timeline_duration(), Some(8.0));
        assert_eq!(player.selected_vocal_track(), Some(PathBuf::from("O.wav")));
    }

    #[test]
    fn test_failed_prepare_returns_to_idle() {
        let player = PlaybackController::new(engine());
        let info = TrackInfo::from_paths("B.wav", "missing.wav", "P.wav", 0.0);
        assert!(matches!(
            player.prepare(&info, true),
            Err(PreviewError::SourceUnreadable { .. })
        ));
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.start().is_err());
    }

    #[test]
    fn test_start_failure_keeps_prepared() {
        let engine = engine();
        let player = PlaybackController::new(engine.clone());
        player.prepare(&info(), true).unwrap();

        engine.set_start_failure(Some("device busy"));
        assert!(matches!(
            player.start(),
            Err(PreviewError::EngineStartFailure { .. })
        ));
        assert_eq!(player.state(), PlaybackState::Prepared);
    }

    #[test]
    fn test_pause_freezes_playhead() {
        let engine = engine();
        let player = PlaybackController::with_config(engine.clone(), fast_config());
        player.prepare(&info(), true).unwrap();
        player.start().unwrap();

        engine.advance(1.5);
        player.pause();
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.current_time(), 1.5);

        engine.advance(1.0);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(player.current_time(), 1.5);

        player.unpause().unwrap();
        engine.advance(0.5);
        assert_eq!(player.current_time(), 2.0);
        player.stop();
    }

    #[test]
    fn test_volume_and_take_switch_apply_live() {
        let engine = engine();
        let player = PlaybackController::new(engine.clone());
        player.prepare(&info(), true).unwrap();

        player.set_volumes(0.6, 0.3);
        assert_eq!(engine.gain(SourceSlot::OriginalVocal), Some(0.6));
        assert_eq!(engine.gain(SourceSlot::Background), Some(0.3));

        player.set_should_use_processed_vocal_track(true).unwrap();
        assert_eq!(engine.gain(SourceSlot::OriginalVocal), Some(0.0));
        assert_eq!(engine.gain(SourceSlot::ProcessedVocal), Some(0.6));
        assert_eq!(player.selected_vocal_track(), Some(PathBuf::from("P.wav")));
        assert_eq!(player.vocal_audio_track_duration(), 7.0);
    }

    #[test]
    fn test_finished_handler_fires_once() {
        let engine = engine();
        let player = PlaybackController::with_config(engine.clone(), fast_config());
        let (tx, rx) = mpsc::channel();
        player.set_playback_finished_handler(move |bg| {
            let _ = tx.send(bg.map(Path::to_path_buf));
        });

        player.prepare(&info(), true).unwrap();
        player.set_preview_window(1.0, 2.0);
        player.start().unwrap();
        engine.advance(5.0);

        let background = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(background, Some(PathBuf::from("B.wav")));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        assert_eq!(player.state(), PlaybackState::Prepared);
        assert_eq!(player.current_time(), 1.0);
    }

    #[test]
    fn test_cleared_handlers_are_not_called() {
        let engine = engine();
        let player = PlaybackController::with_config(engine.clone(), fast_config());
        let (progress_tx, progress_rx) = mpsc::channel();
        player.set_progress_handler(move |t| {
            let _ = progress_tx.send(t);
        });
        let (finished_tx, finished_rx) = mpsc::channel();
        player.set_playback_finished_handler(move |_| {
            let _ = finished_tx.send(());
        });
        player.clear_progress_handler();
        player.clear_playback_finished_handler();

        player.prepare(&info(), true).unwrap();
        player.start().unwrap();
        engine.advance(20.0);
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(player.state(), PlaybackState::Prepared);
        assert!(progress_rx.try_recv().is_err());
        assert!(finished_rx.try_recv().is_err());
    }

    #[test]
    fn test_start_with_tiny_progress_rate() {
        let engine = engine();
        let config = PlaybackConfig {
            progress_updates_per_second: 1e-30,
            ..PlaybackConfig::default()
        };
        let player = PlaybackController::with_config(engine.clone(), config);
        player.prepare(&info(), true).unwrap();

        player.start().unwrap();
        assert!(player.is_playing());
        engine.advance(1.0);
        assert_eq!(player.current_time(), 1.0);
        player.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let engine = engine();
        let player = PlaybackController::new(engine.clone());
        player.stop();
        assert_eq!(engine.release_count(), 0);

        player.prepare(&info(), true).unwrap();
        player.start().unwrap();
        player.stop();
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(engine.release_count(), 1);
        assert!(!engine.is_running());
    }
}
