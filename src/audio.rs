//! WAV helpers shared by the synthesis adapter: sample normalization,
//! PCM16 encoding, the fallback tone and artifact validation.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxError};

/// Size of a canonical WAV header; a file this small holds no audio.
pub const WAV_HEADER_BYTES: u64 = 44;

/// A finished audio file handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub duration_secs: f64,
}

/// Audio as a backend hands it back, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAudio {
    /// Already a flat mono sequence.
    Mono(Vec<f32>),
    /// Consecutive mono chunks, as streamed by most voices.
    Chunks(Vec<Vec<f32>>),
    /// Interleaved frames with `channels` samples each.
    Interleaved { samples: Vec<f32>, channels: u16 },
}

impl RawAudio {
    /// Flatten to a single-channel sequence. Interleaved frames are averaged,
    /// non-finite samples become silence and everything is clamped to [-1, 1].
    pub fn into_mono(self) -> Vec<f32> {
        let mut samples = match self {
            RawAudio::Mono(samples) => samples,
            RawAudio::Chunks(chunks) => chunks.into_iter().flatten().collect(),
            RawAudio::Interleaved { samples, channels } if channels > 1 => samples
                .chunks(channels as usize)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect(),
            RawAudio::Interleaved { samples, .. } => samples,
        };

        for sample in &mut samples {
            *sample = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
        }
        samples
    }
}

/// Decode little-endian signed 16-bit PCM into floats.
pub fn pcm16_le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Write mono samples as PCM16 WAV, replacing whatever was at `path`.
pub fn write_wav_pcm16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Parameters of the last-resort tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub duration_secs: f32,
    pub sample_rate: u32,
    pub amplitude: f32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            duration_secs: 0.5,
            sample_rate: 22050,
            amplitude: 0.5,
        }
    }
}

impl ToneSpec {
    pub fn samples(&self) -> Vec<f32> {
        let count = (self.sample_rate as f32 * self.duration_secs) as usize;
        (0..count)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                self.amplitude * (2.0 * PI * self.frequency_hz * t).sin()
            })
            .collect()
    }
}

/// Check that `path` is a complete, non-trivial WAV file and describe it.
///
/// Anything missing, header-only or unparsable is rejected so a partial
/// write never reaches a caller.
pub fn inspect_wav(path: &Path) -> Result<AudioArtifact> {
    let size = std::fs::metadata(path)?.len();
    if size <= WAV_HEADER_BYTES {
        return Err(VoxError::InputInvalid(format!(
            "{} holds no audio ({size} bytes)",
            path.display()
        )));
    }

    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration();
    if frames == 0 {
        return Err(VoxError::InputInvalid(format!(
            "{} holds no samples",
            path.display()
        )));
    }

    Ok(AudioArtifact {
        path: path.to_path_buf(),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        duration_secs: frames as f64 / spec.sample_rate.max(1) as f64,
    })
}
