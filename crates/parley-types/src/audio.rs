//! Fixed-cadence PCM audio frames.
//!
//! All audio inside Parley is signed 16-bit, mono, at [`SAMPLE_RATE`]. The
//! room transport delivers and accepts audio in frames of
//! [`FRAME_DURATION_MS`]; playback sinks reject or garble buffers that do not
//! match that cadence.

use std::time::Duration;

/// Sample rate used for room audio, transcription and playback.
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count for every frame (mono).
pub const NUM_CHANNELS: u32 = 1;

/// Duration of one frame in milliseconds.
pub const FRAME_DURATION_MS: u32 = 10;

/// Samples in one frame at the default rate and cadence (480).
pub const SAMPLES_PER_FRAME: usize = (SAMPLE_RATE / 1000 * FRAME_DURATION_MS) as usize;

/// Returns the number of mono samples in a frame of `frame_ms` at `sample_rate`.
pub fn samples_per_frame(sample_rate: u32, frame_ms: u32) -> usize {
    (sample_rate as u64 * frame_ms as u64 / 1000) as usize
}

/// Root-mean-square of the sample magnitudes, on the i16 scale.
///
/// Returns `0.0` for an empty slice.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Decodes little-endian s16 PCM bytes into samples.
///
/// A trailing odd byte is ignored.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// One chunk of mono s16 audio.
///
/// A frame always owns its sample buffer. Frames cut from a longer
/// utterance are copied out rather than borrowed, so a sink that reads from
/// the start of the allocation always sees this frame's samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A frame of `len` zero samples.
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0; len], sample_rate)
    }

    /// Copies `chunk` into a new frame of exactly `len` samples, zero-padding
    /// a short chunk and truncating a long one.
    pub fn from_chunk(chunk: &[i16], len: usize, sample_rate: u32) -> Self {
        let mut samples = Vec::with_capacity(len);
        samples.extend_from_slice(&chunk[..chunk.len().min(len)]);
        samples.resize(len, 0);
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel. Frames are mono, so this is the sample count.
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len()
    }

    /// Playback duration of this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / self.sample_rate as u64)
    }

    /// Energy of this frame. See [`rms`].
    pub fn rms(&self) -> f64 {
        rms(&self.samples)
    }

    /// Serializes the samples as little-endian s16 PCM, the wire format the
    /// transcription backend expects.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}
