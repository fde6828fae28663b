//! Offline export of a preview window to a WAV file
//!
//! [`ExportController`] shares the `prepare` step with the player but never
//! touches the live graph: each export builds its own graph and hands a
//! [`BounceRequest`] to the engine on a worker thread. Exactly one
//! [`ExportCompletion`] is delivered per call, always from another thread.

pub mod configuration;

pub use configuration::ExportConfiguration;
pub use crate::engine::BounceSummary as ExportReport;

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::engine::{BounceRequest, EngineError, MixMode, RenderEngine};
use crate::error::{PreviewError, Result};
use crate::session::{PreparedSession, Volumes};
use crate::sync::lock;
use crate::track::TrackInfo;

/// Outcome of one `export_using_configuration` call
#[derive(Debug)]
pub struct ExportCompletion {
    pub job_id: Uuid,
    pub output_file: PathBuf,
    pub result: Result<ExportReport>,
}

impl ExportCompletion {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&PreviewError> {
        self.result.as_ref().err()
    }
}

/// `mixed_<UTC timestamp>.wav` inside `dir`
pub fn default_output_file(dir: impl AsRef<Path>) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    dir.as_ref().join(format!("mixed_{}.wav", stamp))
}

#[derive(Debug, Default)]
struct ExportState {
    session: Option<PreparedSession>,
    use_processed: bool,
}

/// Renders windows of a prepared recording to files
pub struct ExportController {
    engine: Arc<dyn RenderEngine>,
    config: ExportConfig,
    state: Mutex<ExportState>,
    in_flight: Arc<AtomicBool>,
}

impl ExportController {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self::with_config(engine, ExportConfig::default())
    }

    pub fn with_config(engine: Arc<dyn RenderEngine>, config: ExportConfig) -> Self {
        Self {
            engine,
            config,
            state: Mutex::new(ExportState::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open and measure the tracks in `track_info`
    ///
    /// Same checks as [`crate::PlaybackController::prepare`].
    pub fn prepare(&self, track_info: &TrackInfo, should_mix_audio: bool) -> Result<()> {
        let mix_mode = MixMode::from_should_mix(should_mix_audio);
        let mut state = lock(&self.state);
        state.session = None;

        let session =
            PreparedSession::open(self.engine.as_ref(), track_info, mix_mode, state.use_processed)?;
        info!(
            "[EXPORT] Prepared {:?}, timeline {:.3}s",
            mix_mode,
            session.timeline_secs(mix_mode)
        );
        state.session = Some(session);
        Ok(())
    }

    pub fn should_use_processed_vocal_track(&self) -> bool {
        lock(&self.state).use_processed
    }

    /// Select the vocal take used by later exports
    ///
    /// # Errors
    /// * `SourceUnreadable` - processed requested but none was prepared
    pub fn set_should_use_processed_vocal_track(&self, use_processed: bool) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(session) = &state.session {
            if use_processed && !session.has_processed_vocal() {
                return Err(PreviewError::SourceUnreadable {
                    path: PathBuf::new(),
                    reason: "no processed vocal track was provided".to_string(),
                });
            }
        }
        state.use_processed = use_processed;
        Ok(())
    }

    pub fn selected_vocal_track(&self) -> Option<PathBuf> {
        let state = lock(&self.state);
        state.session.as_ref().and_then(|s| {
            s.track_info
                .vocal_track(state.use_processed)
                .ok()
                .map(Path::to_path_buf)
        })
    }

    pub fn vocal_audio_track_duration(&self) -> f64 {
        let state = lock(&self.state);
        state
            .session
            .as_ref()
            .map_or(0.0, |s| s.vocal_duration(state.use_processed))
    }

    pub fn background_audio_track_duration(&self) -> f64 {
        lock(&self.state)
            .session
            .as_ref()
            .map_or(0.0, |s| s.background_duration())
    }

    /// Whether an export is running
    pub fn is_exporting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Render `configuration`'s window to `output_file`
    ///
    /// Returns the job id immediately. `completion` is called exactly once
    /// from a worker thread, with the report or one of
    /// `ConfigurationInvalid`, `InvalidState`, `SourceUnreadable`,
    /// `OutputWriteFailure`, `EngineRenderFailure` or `ExportInProgress`.
    /// A rejected concurrent call leaves the running export alone.
    pub fn export_using_configuration<F>(
        &self,
        configuration: &ExportConfiguration,
        output_file: impl Into<PathBuf>,
        should_mix_audio: bool,
        completion: F,
    ) -> Uuid
    where
        F: FnOnce(ExportCompletion) + Send + 'static,
    {
        let job_id = Uuid::new_v4();
        let output_file = output_file.into();

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("[EXPORT] Job {} rejected: another export is running", job_id);
            run_detached(move || {
                completion(ExportCompletion {
                    job_id,
                    output_file,
                    result: Err(PreviewError::ExportInProgress),
                })
            });
            return job_id;
        }

        let mix_mode = MixMode::from_should_mix(should_mix_audio);
        let request = match self.plan(configuration, &output_file, mix_mode) {
            Ok(request) => request,
            Err(err) => {
                self.in_flight.store(false, Ordering::Release);
                warn!("[EXPORT] Job {} rejected: {}", job_id, err);
                run_detached(move || {
                    completion(ExportCompletion {
                        job_id,
                        output_file,
                        result: Err(err),
                    })
                });
                return job_id;
            }
        };

        info!(
            "[EXPORT] Job {} started: {:.3}s..{:.3}s {:?} -> {}",
            job_id,
            request.start_time,
            request.start_time + request.duration,
            mix_mode,
            output_file.display()
        );

        let engine = Arc::clone(&self.engine);
        let in_flight = Arc::clone(&self.in_flight);
        run_detached(move || {
            let slot = InFlightGuard(in_flight);
            let result = render_contained(engine.as_ref(), &request);
            drop(slot);

            match &result {
                Ok(report) => info!(
                    "[EXPORT] Job {} complete: {} frames, {:.3}s",
                    job_id, report.frames_written, report.duration_secs
                ),
                Err(e) => warn!("[EXPORT] Job {} failed: {}", job_id, e),
            }

            completion(ExportCompletion {
                job_id,
                output_file: request.output_file,
                result,
            })
        });

        job_id
    }

    /// Validate a request against the prepared session and build its bounce
    fn plan(
        &self,
        configuration: &ExportConfiguration,
        output_file: &Path,
        mix_mode: MixMode,
    ) -> Result<BounceRequest> {
        configuration.validate()?;

        let state = lock(&self.state);
        let session = state
            .session
            .as_ref()
            .ok_or_else(|| PreviewError::InvalidState {
                operation: "export",
                state: "not prepared".to_string(),
            })?;
        session.check_alignment(mix_mode)?;
        session.track_info.vocal_track(state.use_processed)?;

        let timeline = session.timeline_secs(mix_mode);
        if configuration.start_time >= timeline {
            return Err(PreviewError::invalid_config(format!(
                "export start {:.3}s is past the end of the timeline ({:.3}s)",
                configuration.start_time, timeline
            )));
        }
        let duration = configuration
            .duration
            .min(timeline - configuration.start_time);
        if duration < configuration.duration {
            debug!(
                "[EXPORT] Window clipped to {:.3}s at the timeline end",
                duration
            );
        }

        let volumes = Volumes::new(
            configuration.audio_track_volume,
            configuration.background_volume_or(self.config.default_background_volume),
        );

        Ok(BounceRequest {
            graph: session.graph(mix_mode, volumes, state.use_processed),
            start_time: configuration.start_time,
            duration,
            output_file: output_file.to_path_buf(),
            format: self.config.format(),
        })
    }
}

/// Run `job` on a named export thread. If the thread cannot be spawned the
/// job runs inline so its completion is still delivered.
fn run_detached<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(job)));
    let worker_slot = Arc::clone(&slot);

    let spawned = thread::Builder::new()
        .name("preview-export".into())
        .spawn(move || {
            let job = lock(&worker_slot).take();
            if let Some(job) = job {
                job();
            }
        });

    if let Err(e) = spawned {
        error!("[EXPORT] Cannot spawn export thread, running inline: {}", e);
        let job = lock(&slot).take();
        if let Some(job) = job {
            job();
        }
    }
}

/// Frees the single export slot when the worker finishes, even by unwinding
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run the engine's bounce, turning a panic into `EngineRenderFailure`
fn render_contained(engine: &dyn RenderEngine, request: &BounceRequest) -> Result<ExportReport> {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.render(request))) {
        Ok(rendered) => rendered.map_err(render_error),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("[EXPORT] Engine panicked during render: {}", message);
            Err(PreviewError::EngineRenderFailure {
                reason: format!("render panicked: {}", message),
            })
        }
    }
}

fn render_error(err: EngineError) -> PreviewError {
    match err {
        EngineError::Unreadable { path, reason } => PreviewError::SourceUnreadable { path, reason },
        EngineError::Output { path, reason } => PreviewError::OutputWriteFailure { path, reason },
        other => PreviewError::EngineRenderFailure {
            reason: other.to_string(),
        },
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

    fn prepared(engine: &Arc<MockEngine>) -> ExportController {
        let exporter = ExportController::new(engine.clone());
        exporter
            .prepare(&TrackInfo::from_paths("B.wav", "O.wav", "P.wav", 2.0), true)
            .unwrap();
        exporter
    }

    fn export(
        exporter: &ExportController,
        configuration: ExportConfiguration,
    ) -> mpsc::Receiver<ExportCompletion> {
        let (tx, rx) = mpsc::channel();
        exporter.export_using_configuration(&configuration, "out.wav", true, move |done| {
            let _ = tx.send(done);
        });
        rx
    }

    #[test]
    fn test_default_output_file_name() {
        let path = default_output_file("/tmp/exports");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mixed_"));
        assert!(name.ends_with(".wav"));
        assert_eq!(path.parent(), Some(Path::new("/tmp/exports")));
    }

    #[test]
    fn test_export_builds_bounce() {
        let engine = engine();
        let exporter = prepared(&engine);
        exporter.set_should_use_processed_vocal_track(true).unwrap();

        let rx = export(
            &exporter,
            ExportConfiguration::with_background_volume(1.0, 3.0, 0.9, 0.4),
        );
        let done = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(done.is_success());
        assert_eq!(done.output_file, PathBuf::from("out.wav"));

        let request = &engine.renders()[0];
        assert_eq!(request.start_time, 1.0);
        assert_eq!(request.duration, 3.0);
        assert_eq!(request.graph.source(SourceSlot::Background).unwrap().gain, 0.4);
        assert_eq!(request.graph.source(SourceSlot::ProcessedVocal).unwrap().gain, 0.9);
        assert_eq!(request.graph.source(SourceSlot::OriginalVocal).unwrap().gain, 0.0);
        assert!(!exporter.is_exporting());
    }

    #[test]
    fn test_window_clipped_to_timeline() {
        let engine = engine();
        let exporter = prepared(&engine);
        let rx = export(&exporter, ExportConfiguration::new(6.0, 5.0, 1.0));
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().is_success());
        assert_eq!(engine.renders()[0].duration, 2.0);

        let rx = export(&exporter, ExportConfiguration::new(8.0, 1.0, 1.0));
        let done = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(done.error().unwrap().error_code(), "CONFIGURATION_INVALID");
    }

    #[test]
    fn test_export_before_prepare() {
        let exporter = ExportController::new(engine());
        let rx = export(&exporter, ExportConfiguration::new(0.0, 1.0, 1.0));
        let done = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match done.error() {
            Some(PreviewError::InvalidState { operation, .. }) => assert_eq!(*operation, "export"),
            other => panic!("Expected InvalidState, got: {:?}", other),
        }
    }

    #[test]
    fn test_engine_errors_are_mapped() {
        let engine = engine();
        let exporter = prepared(&engine);
        engine.set_render_failure(Some(EngineError::Output {
            path: PathBuf::from("out.wav"),
            reason: "read-only".to_string(),
        }));
        let rx = export(&exporter, ExportConfiguration::new(0.0, 1.0, 1.0));
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().error(),
            Some(PreviewError::OutputWriteFailure { .. })
        ));

        engine.set_render_failure(Some(EngineError::Render {
            reason: "clipped".to_string(),
        }));
        let rx = export(&exporter, ExportConfiguration::new(0.0, 1.0, 1.0));
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().error(),
            Some(PreviewError::EngineRenderFailure { .. })
        ));
    }

    #[test]
    fn test_panicking_render_completes_once() {
        let engine = engine();
        let exporter = prepared(&engine);
        engine.set_render_panic(Some("driver fault"));

        let rx = export(&exporter, ExportConfiguration::new(0.0, 1.0, 1.0));
        let done = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match done.error() {
            Some(PreviewError::EngineRenderFailure { reason }) => {
                assert!(reason.contains("driver fault"));
            }
            other => panic!("Expected EngineRenderFailure, got: {:?}", other),
        }
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!exporter.is_exporting());

        engine.set_render_panic(None);
        let rx = export(&exporter, ExportConfiguration::new(0.0, 1.0, 1.0));
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().is_success());
        assert_eq!(engine.renders().len(), 2);
    }
}
