//! Playback state machine and playhead
//!
//! `Idle -> Prepared -> Playing <-> Paused -> Stopped`, with `Idle` and
//! `Stopped` re-entered through `prepare`. The playhead is always clamped to
//! the active window `[playback_start_time, window_end]`.

use std::fmt;

use log::debug;

use crate::error::{PreviewError, Result};

/// Lifecycle state of a [`crate::PlaybackController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Never prepared, or the last prepare failed
    #[default]
    Idle,
    /// Sources loaded, ready to start
    Prepared,
    Playing,
    Paused,
    /// Engine resources released; prepare again to play
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Prepared => write!(f, "Prepared"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
            PlaybackState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// State, window and playhead of one player
#[derive(Debug, Clone, Default)]
pub struct Transport {
    state: PlaybackState,
    playback_start_time: f64,
    /// Requested window length; 0 means "to the end of the timeline"
    playback_duration: f64,
    current_time: f64,
    /// Aligned timeline length, known once prepared
    timeline_secs: Option<f64>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    /// Playing or paused: the engine holds a running or frozen time base
    pub fn is_active(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
    }

    // ========================================================================
    // Window
    // ========================================================================

    pub fn playback_start_time(&self) -> f64 {
        self.playback_start_time
    }

    pub fn set_playback_start_time(&mut self, seconds: f64) {
        self.playback_start_time = non_negative(seconds);
        self.current_time = self.clamp(self.current_time);
    }

    pub fn playback_duration(&self) -> f64 {
        self.playback_duration
    }

    pub fn set_playback_duration(&mut self, seconds: f64) {
        self.playback_duration = non_negative(seconds);
        self.current_time = self.clamp(self.current_time);
    }

    pub fn timeline_secs(&self) -> Option<f64> {
        self.timeline_secs
    }

    /// End of the active window
    ///
    /// An unset duration runs to the timeline end; a window past the
    /// timeline is cut at the timeline end.
    pub fn window_end(&self) -> f64 {
        let start = self.playback_start_time;
        let requested = if self.playback_duration > 0.0 {
            start + self.playback_duration
        } else {
            f64::INFINITY
        };
        let end = match self.timeline_secs {
            Some(timeline) => requested.min(timeline),
            None if self.playback_duration > 0.0 => requested,
            None => start,
        };
        end.max(start)
    }

    // ========================================================================
    // Playhead
    // ========================================================================

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Seek; returns the clamped position
    pub fn set_current_time(&mut self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() {
            seconds
        } else {
            self.playback_start_time
        };
        self.current_time = self.clamp(seconds);
        debug!("[TRANSPORT] Seek to {:.3}s", self.current_time);
        self.current_time
    }

    /// Follow the engine clock. The playhead never moves backwards here.
    /// Returns true once the window end is reached.
    pub fn advance_to(&mut self, engine_position: f64) -> bool {
        if engine_position.is_finite() {
            self.current_time = self.clamp(engine_position.max(self.current_time));
        }
        self.current_time >= self.window_end()
    }

    fn clamp(&self, seconds: f64) -> f64 {
        seconds.clamp(self.playback_start_time, self.window_end())
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Sources are loaded for a timeline of `timeline_secs`
    pub fn prepared(&mut self, timeline_secs: f64) {
        self.timeline_secs = Some(timeline_secs);
        self.state = PlaybackState::Prepared;
        self.current_time = self.playback_start_time;
        debug!("[TRANSPORT] Prepared, timeline {:.3}s", timeline_secs);
    }

    /// Prepare failed: nothing is loaded
    pub fn reset(&mut self) {
        self.timeline_secs = None;
        self.state = PlaybackState::Idle;
        self.current_time = self.playback_start_time;
    }

    /// Check that playback may begin. Valid from `Prepared` or `Paused`.
    pub fn check_can_start(&self) -> Result<()> {
        match self.state {
            PlaybackState::Prepared | PlaybackState::Paused => Ok(()),
            other => Err(invalid("start", other)),
        }
    }

    /// `Prepared | Paused -> Playing`
    pub fn play(&mut self) -> Result<()> {
        self.check_can_start()?;
        self.state = PlaybackState::Playing;
        debug!("[TRANSPORT] Play from {:.3}s", self.current_time);
        Ok(())
    }

    /// `Playing -> Paused`; no-op otherwise. Returns whether it paused.
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            debug!("[TRANSPORT] Pause ignored while {}", self.state);
            return false;
        }
        self.state = PlaybackState::Paused;
        debug!("[TRANSPORT] Paused at {:.3}s", self.current_time);
        true
    }

    pub fn check_can_resume(&self) -> Result<()> {
        if self.is_paused() {
            Ok(())
        } else {
            Err(invalid("unpause", self.state))
        }
    }

    /// `Paused -> Playing`
    pub fn resume(&mut self) -> Result<()> {
        self.check_can_resume()?;
        self.state = PlaybackState::Playing;
        debug!("[TRANSPORT] Resumed at {:.3}s", self.current_time);
        Ok(())
    }

    /// Window played out: back to `Prepared`, playhead rewound
    pub fn finish(&mut self) {
        self.state = PlaybackState::Prepared;
        self.current_time = self.playback_start_time;
        debug!("[TRANSPORT] Finished, playhead reset");
    }

    /// Any state -> `Stopped` (or `Idle` if never prepared), playhead rewound
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            self.state = PlaybackState::Stopped;
        }
        self.current_time = self.playback_start_time;
        debug!("[TRANSPORT] Stopped, playhead reset");
    }
}

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

fn invalid(operation: &'static str, state: PlaybackState) -> PreviewError {
    PreviewError::InvalidState {
        operation,
        state: state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(timeline: f64) -> Transport {
        let mut transport = Transport::new();
        transport.prepared(timeline);
        transport
    }

    #[test]
    fn test_initial_state() {
        let transport = Transport::new();
        assert_eq!(transport.state(), PlaybackState::Idle);
        assert_eq!(transport.current_time(), 0.0);
        assert!(transport.check_can_start().is_err());
    }

    #[test]
    fn test_window_end_defaults_to_timeline() {
        let mut transport = prepared(8.0);
        assert_eq!(transport.window_end(), 8.0);

        transport.set_playback_start_time(1.0);
        transport.set_playback_duration(3.0);
        assert_eq!(transport.window_end(), 4.0);

        transport.set_playback_duration(30.0);
        assert_eq!(transport.window_end(), 8.0);

        transport.set_playback_start_time(9.0);
        assert_eq!(transport.window_end(), 9.0);
    }

    #[test]
    fn test_current_time_is_clamped() {
        let mut transport = prepared(10.0);
        transport.set_playback_start_time(2.0);
        transport.set_playback_duration(3.0);

        assert_eq!(transport.set_current_time(0.0), 2.0);
        assert_eq!(transport.set_current_time(4.5), 4.5);
        assert_eq!(transport.set_current_time(99.0), 5.0);
        assert_eq!(transport.set_current_time(f64::NAN), 2.0);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut transport = prepared(10.0);
        transport.play().unwrap();

        assert!(!transport.advance_to(1.0));
        assert!(!transport.advance_to(0.5));
        assert_eq!(transport.current_time(), 1.0);

        assert!(transport.advance_to(12.0));
        assert_eq!(transport.current_time(), 10.0);
    }

    #[test]
    fn test_play_twice_is_invalid() {
        let mut transport = prepared(10.0);
        transport.play().unwrap();
        match transport.play() {
            Err(PreviewError::InvalidState { operation, state }) => {
                assert_eq!(operation, "start");
                assert_eq!(state, "Playing");
            }
            other => panic!("Expected InvalidState, got: {:?}", other),
        }
    }

    #[test]
    fn test_pause_resume_cycle() {
        let mut transport = prepared(10.0);
        assert!(!transport.pause());
        assert!(transport.resume().is_err());

        transport.play().unwrap();
        transport.advance_to(3.0);
        assert!(transport.pause());
        assert!(transport.is_paused());
        assert!(!transport.pause());
        assert_eq!(transport.current_time(), 3.0);

        transport.resume().unwrap();
        assert!(transport.is_playing());
        assert!(!transport.is_paused());
    }

    #[test]
    fn test_stop_and_finish() {
        let mut transport = Transport::new();
        transport.stop();
        assert_eq!(transport.state(), PlaybackState::Idle);

        transport.prepared(10.0);
        transport.play().unwrap();
        transport.advance_to(4.0);
        transport.finish();
        assert_eq!(transport.state(), PlaybackState::Prepared);
        assert_eq!(transport.current_time(), 0.0);

        transport.play().unwrap();
        transport.stop();
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert!(transport.check_can_start().is_err());
    }
}
