//! WAV file I/O for the bundled engine
//!
//! Sources are decoded to 32-bit float and resampled to the engine rate on
//! import. Rendered mixes are written as 16/24-bit integer or 32-bit float
//! WAV.
//!
//! Sample rate conversion uses linear interpolation.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::{EngineError, EngineResult, SourceInfo};

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFormat {
    /// Target sample rate (default: 48000)
    pub sample_rate: u32,
    /// Bit depth: 16, 24, or 32 (default: 24)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat {
            sample_rate: 48000,
            bit_depth: 24,
        }
    }
}

impl ExportFormat {
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        ExportFormat {
            sample_rate,
            bit_depth,
        }
    }

    /// CD quality (44.1kHz, 16-bit)
    pub fn cd_quality() -> Self {
        ExportFormat::new(44100, 16)
    }
}

/// Read WAV header metadata without decoding samples
pub fn probe_audio(path: &Path) -> EngineResult<SourceInfo> {
    let reader = open_reader(path)?;
    let spec = reader.spec();
    let frames = reader.duration() as usize;

    Ok(SourceInfo {
        path: path.to_path_buf(),
        duration_secs: frames as f64 / spec.sample_rate as f64,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Import a WAV file, converting to float and resampling to `target_rate`
///
/// # Errors
/// * `Unreadable` - missing file, invalid WAV, more than 2 channels,
///   unsupported bit depth, or no samples
pub fn import_audio(path: &Path, target_rate: u32) -> EngineResult<AudioBuffer> {
    let reader = open_reader(path)?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if ChannelLayout::from_count(channels).is_none() {
        return Err(unreadable(
            path,
            format!("{}-channel audio (only mono/stereo supported)", channels),
        ));
    }

    let samples_f32 = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)
        .map_err(|reason| unreadable(path, reason))?;

    let channel_data = deinterleave(&samples_f32, channels);
    let resampled = if spec.sample_rate != target_rate {
        resample_channels(&channel_data, spec.sample_rate, target_rate)
    } else {
        channel_data
    };

    let buffer = AudioBuffer::from_channels(resampled, target_rate)
        .ok_or_else(|| unreadable(path, "inconsistent channel data"))?;
    if buffer.is_empty() {
        return Err(unreadable(path, "audio contains no samples"));
    }

    Ok(buffer)
}

/// Export an AudioBuffer to a WAV file, returning the frames written
///
/// Resamples if the target sample rate differs from the buffer's.
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> EngineResult<u64> {
    if format.sample_rate == 0 || buffer.sample_rate() == 0 {
        return Err(EngineError::Render {
            reason: "sample rate must be positive".to_string(),
        });
    }
    let sample_format = match format.bit_depth {
        16 | 24 => SampleFormat::Int,
        32 => SampleFormat::Float,
        other => {
            return Err(EngineError::Render {
                reason: format!("{}-bit audio (only 16, 24, 32 supported)", other),
            })
        }
    };

    let export_data = if format.sample_rate != buffer.sample_rate() {
        resample_channels(&buffer.samples, buffer.sample_rate(), format.sample_rate)
    } else {
        buffer.samples.clone()
    };
    let frames = export_data.first().map_or(0, Vec::len) as u64;
    let interleaved = interleave(&export_data);

    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format,
    };

    let output_err = |e: hound::Error| EngineError::Output {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut writer = WavWriter::create(path, spec).map_err(output_err)?;

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(output_err)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(output_err)?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(output_err)?;
            }
        }
    }

    writer.finalize().map_err(output_err)?;

    Ok(frames)
}

/// Generate a mono sine tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;

    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn open_reader(path: &Path) -> EngineResult<WavReader<std::io::BufReader<std::fs::File>>> {
    if !path.exists() {
        return Err(unreadable(path, "file not found"));
    }
    let reader = WavReader::open(path)
        .map_err(|e| unreadable(path, format!("failed to open WAV file: {}", e)))?;
    if reader.spec().sample_rate == 0 {
        return Err(unreadable(path, "zero sample rate"));
    }
    Ok(reader)
}

fn unreadable(path: &Path, reason: impl Into<String>) -> EngineError {
    EngineError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> std::result::Result<Vec<f32>, String> {
    let describe = |e: hound::Error| format!("failed to read {}-bit samples: {}", bits_per_sample, e);

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(describe),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(describe),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(describe),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(describe),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(describe),
        (SampleFormat::Int, bits) => Err(format!("unsupported {}-bit integer audio", bits)),
    }
}

/// De-interleave samples from [L,R,L,R,...] to [[L,L,...], [R,R,...]]
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut result = vec![Vec::with_capacity(frames); channels];

    for (i, sample) in samples.iter().take(frames * channels).enumerate() {
        result[i % channels].push(*sample);
    }

    result
}

/// Interleave channels from [[L,L,...], [R,R,...]] to [L,R,L,R,...]
fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    if channels.is_empty() {
        return Vec::new();
    }

    let num_channels = channels.len();
    let frames = channels[0].len();
    let mut result = Vec::with_capacity(frames * num_channels);

    for frame in 0..frames {
        for channel in channels {
            result.push(channel[frame]);
        }
    }

    result
}

fn resample_channels(channels: &[Vec<f32>], source_rate: u32, target_rate: u32) -> Vec<Vec<f32>> {
    let ratio = target_rate as f64 / source_rate as f64;

    channels
        .iter()
        .map(|channel| resample_linear(channel, ratio))
        .collect()
}

fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_interleave_deinterleave() {
        let left = vec![1.0, 2.0, 3.0, 4.0];
        let right = vec![5.0, 6.0, 7.0, 8.0];
        let interleaved = interleave(&[left.clone(), right.clone()]);
        assert_eq!(interleaved, vec![1.0, 5.0, 2.0, 6.0, 3.0, 7.0, 4.0, 8.0]);

        let deinterleaved = deinterleave(&interleaved, 2);
        assert_eq!(deinterleaved[0], left);
        assert_eq!(deinterleaved[1], right);
    }

    #[test]
    fn test_resample_linear_upsample() {
        let resampled = resample_linear(&[0.0, 1.0, 0.0], 2.0);
        assert!(resampled.len() >= 5);
        assert!((resampled[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_probe_reports_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(440.0, 0.5, 44100);
        export_audio(&tone, &path, ExportFormat::cd_quality()).unwrap();

        let info = probe_audio(&path).unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 1);
        assert_relative_eq!(info.duration_secs, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_import_resamples_to_target_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(440.0, 0.5, 44100);
        export_audio(&tone, &path, ExportFormat::cd_quality()).unwrap();

        let imported = import_audio(&path, INTERNAL_SAMPLE_RATE).unwrap();
        assert_eq!(imported.sample_rate(), INTERNAL_SAMPLE_RATE);
        assert_relative_eq!(imported.duration_secs(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_float_export_is_lossless() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let tone = generate_test_tone(1000.0, 0.2, INTERNAL_SAMPLE_RATE);
        export_audio(&tone, &path, ExportFormat::new(INTERNAL_SAMPLE_RATE, 32)).unwrap();

        let imported = import_audio(&path, INTERNAL_SAMPLE_RATE).unwrap();
        for (orig, imp) in tone.channel(0).iter().zip(imported.channel(0)) {
            assert!((orig - imp).abs() < 1e-6, "Sample mismatch: {} vs {}", orig, imp);
        }
    }

    #[test]
    fn test_import_nonexistent_file() {
        match import_audio(Path::new("/nonexistent/path/audio.wav"), INTERNAL_SAMPLE_RATE) {
            Err(EngineError::Unreadable { path, .. }) => {
                assert!(path.to_string_lossy().contains("nonexistent"));
            }
            other => panic!("Expected Unreadable error, got: {:?}", other),
        }
    }

    #[test]
    fn test_import_rejects_non_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();
        assert!(matches!(
            import_audio(&path, INTERNAL_SAMPLE_RATE),
            Err(EngineError::Unreadable { .. })
        ));
    }

    /// Mono PCM16 file whose header claims `sample_rate`
    fn write_pcm16_header(path: &Path, sample_rate: u32, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_handwritten_header_is_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.wav");
        write_pcm16_header(&path, 8000, &[0, 16384, -16384, 0]);

        let info = probe_audio(&path).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_relative_eq!(info.duration_secs, 4.0 / 8000.0);
        assert_eq!(import_audio(&path, 8000).unwrap().num_samples(), 4);
    }

    #[test]
    fn test_zero_sample_rate_is_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zero_rate.wav");
        write_pcm16_header(&path, 0, &[0, 16384, -16384, 0]);

        match probe_audio(&path) {
            Err(EngineError::Unreadable { reason, .. }) => {
                assert!(reason.contains("zero sample rate"));
            }
            other => panic!("Expected Unreadable error, got: {:?}", other),
        }
        assert!(matches!(
            import_audio(&path, INTERNAL_SAMPLE_RATE),
            Err(EngineError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_export_rejects_zero_sample_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let tone = generate_test_tone(440.0, 0.1, INTERNAL_SAMPLE_RATE);

        let result = export_audio(&tone, &path, ExportFormat::new(0, 16));
        assert!(matches!(result, Err(EngineError::Render { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_export_to_missing_directory() {
        let tone = generate_test_tone(440.0, 0.1, INTERNAL_SAMPLE_RATE);
        let result = export_audio(
            &tone,
            Path::new("/nonexistent/dir/out.wav"),
            ExportFormat::default(),
        );
        assert!(matches!(result, Err(EngineError::Output { .. })));
    }
}
