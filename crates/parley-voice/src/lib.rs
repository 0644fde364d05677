//! Real-time voice agent runtime.
//!
//! Room audio is gated by an energy detector and streamed to a remote
//! recognizer; final transcripts drive a three-state turn-taking machine
//! that answers through an interruptible speech pipeline. A silence
//! watchdog prompts the user when the room stays quiet.
//!
//! The crate is transport-agnostic: the room side is reached through the
//! [`AudioSink`] trait for outgoing audio and a plain channel of
//! [`parley_types::AudioFrame`]s for incoming audio. [`VoiceService`]
//! covers the LiveKit server API (tokens, rooms, participants).

pub mod agent;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod state;
pub mod stt;
pub mod transcode;
pub mod tts;
pub mod vad;
pub mod watchdog;

pub use agent::{AgentLoop, SpokenReminder};
pub use config::{AgentConfig, LiveKitConfig, SttConfig, TtsConfig, TtsEncoding};
pub use error::VoiceError;
pub use pipeline::{AudioSink, Playback, SpeakOutcome, SpeechPipeline};
pub use service::VoiceService;
pub use state::{AgentStateCell, StateChange};
pub use stt::{AudioUplink, SttHandle, TranscriptionClient};
pub use transcode::{FfmpegTranscoder, RawPcmTranscoder, Transcoder};
pub use tts::{HttpSynthesizer, Synthesizer};
pub use vad::EnergyGate;
pub use watchdog::{Reminder, SilenceWatchdog};
