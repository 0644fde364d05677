//! Shared types and constants for the Parley voice agent.
//!
//! This crate provides the foundational types used across the workspace:
//! the turn-taking [`AgentState`] and its legal [`Transition`]s, the
//! fixed-cadence [`AudioFrame`], and the [`Transcript`] produced by the
//! transcription backend.
//!
//! Nothing here performs I/O. Crates that do (the voice pipeline, the agent
//! binary) depend on `parley-types` for cross-cutting definitions so the
//! dependency graph stays acyclic.

use serde::{Deserialize, Serialize};

mod audio;
mod state;

pub use audio::{
    pcm_from_le_bytes, rms, samples_per_frame, AudioFrame, FRAME_DURATION_MS, NUM_CHANNELS,
    SAMPLES_PER_FRAME, SAMPLE_RATE,
};
pub use state::{AgentState, InvalidTransition, Transition};

/// A transcription result delivered by the speech-to-text backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// The recognised text of the best alternative.
    pub text: String,
    /// Whether the backend marked this result as stable.
    pub is_final: bool,
}

impl Transcript {
    /// Creates a final transcript.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// Creates an interim (possibly revised later) transcript.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Returns `true` if the transcript is final and carries non-blank text.
    ///
    /// Only actionable transcripts may start a reply.
    pub fn is_actionable(&self) -> bool {
        self.is_final && !self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_final_non_blank_transcripts_are_actionable() {
        assert!(Transcript::final_text("hello").is_actionable());
        assert!(!Transcript::interim("hello").is_actionable());
        assert!(!Transcript::final_text("").is_actionable());
        assert!(!Transcript::final_text("   ").is_actionable());
    }

    #[test]
    fn transcript_serializes_with_snake_case_fields() {
        let json = serde_json::to_value(Transcript::final_text("hi")).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["is_final"], true);
    }
}
