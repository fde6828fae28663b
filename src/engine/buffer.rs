//! Audio Buffer Management
//!
//! Planar 32-bit float buffers used by the WAV engine for decoded sources
//! and rendered mixes.

// ============================================================================
// Constants
// ============================================================================

/// Rate every decoded source is normalised to (48kHz)
pub const INTERNAL_SAMPLE_RATE: u32 = 48000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Convert seconds to a frame index at `sample_rate`, rounding to nearest
#[inline]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> i64 {
    (seconds * sample_rate as f64).round() as i64
}

/// Convert a frame count at `sample_rate` to seconds
#[inline]
pub fn frames_to_seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Calculate the peak level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar audio: `samples[channel][frame]`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data, one Vec per channel. All channels have equal length.
    pub samples: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Build from planar channel data. Returns None for unsupported channel
    /// counts or ragged channels.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Option<Self> {
        ChannelLayout::from_count(samples.len())?;
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return None;
        }
        Some(Self {
            samples,
            sample_rate,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames per channel
    pub fn num_samples(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_seconds(self.num_samples(), self.sample_rate)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Sample at `frame`, or silence outside the buffer. Mono sources are
    /// read for every output channel.
    #[inline]
    pub fn sample_or_silence(&self, channel: usize, frame: i64) -> f32 {
        if frame < 0 || self.samples.is_empty() {
            return 0.0;
        }
        let ch = channel.min(self.samples.len() - 1);
        self.samples[ch].get(frame as usize).copied().unwrap_or(0.0)
    }

    /// Add `source * gain` into this buffer, reading `source` from
    /// `source_start` (may be negative, which reads leading silence).
    /// Both buffers must share a sample rate.
    pub fn add_scaled(&mut self, source: &AudioBuffer, source_start: i64, gain: f32) {
        if gain == 0.0 {
            return;
        }
        for (ch, out) in self.samples.iter_mut().enumerate() {
            for (i, sample) in out.iter_mut().enumerate() {
                *sample += source.sample_or_silence(ch, source_start + i as i64) * gain;
            }
        }
    }

    /// Check that every sample is finite
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .all(|s| s.is_finite())
    }

    /// Hard-clip all samples to [-1.0, 1.0]
    pub fn clamp(&mut self) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo, INTERNAL_SAMPLE_RATE)
    }
}
