//! Energy-based voice activity gating.

use parley_types::{rms, AudioFrame};

/// Classifies frames as speech when their RMS reaches a fixed threshold.
///
/// The threshold sits far below conversational speech but above the
/// electrical and background noise floor of a room feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyGate {
    threshold: f64,
}

impl EnergyGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns `true` if the samples carry speech-level energy.
    pub fn is_speech(&self, samples: &[i16]) -> bool {
        !samples.is_empty() && rms(samples) >= self.threshold
    }

    pub fn is_active(&self, frame: &AudioFrame) -> bool {
        self.is_speech(frame.samples())
    }
}
