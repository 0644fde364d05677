//! Interruptible text-to-audio playback.
//!
//! A playback session fetches synthesized audio, transcodes it to PCM and
//! feeds it to the registered [`AudioSink`] one fixed-duration frame at a
//! time. The session's cancellation token is checked before the fetch,
//! before transcoding and before every frame, so [`SpeechPipeline::stop`]
//! silences the agent within one frame of being called.

use crate::config::{AgentConfig, TtsConfig, TtsEncoding};
use crate::error::VoiceError;
use crate::state::AgentStateCell;
use crate::transcode::{FfmpegTranscoder, RawPcmTranscoder, Transcoder};
use crate::tts::{HttpSynthesizer, Synthesizer};
use async_trait::async_trait;
use parley_types::{samples_per_frame, AudioFrame, Transition, FRAME_DURATION_MS, SAMPLE_RATE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// Default payload floor below which a synthesis response is not audio.
pub const DEFAULT_MIN_PAYLOAD_BYTES: usize = 1024;

/// Destination for the agent's outgoing audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Accepts one frame. Resolves once the sink has taken the frame at its
    /// playback cadence.
    async fn push(&self, frame: AudioFrame) -> Result<(), VoiceError>;
}

/// How a playback session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Every frame reached the sink.
    Completed { frames: usize },
    /// Stopped or superseded after `frames` frames.
    Interrupted { frames: usize },
    /// Synthesis, transcoding or the sink failed, or the audio was unusable.
    Failed,
    /// No sink was registered; nothing happened.
    Skipped,
}

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

type SessionSlot = Arc<Mutex<Option<ActiveSession>>>;

fn lock_session(slot: &SessionSlot) -> MutexGuard<'_, Option<ActiveSession>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A started playback session.
///
/// Dropping it ends the session: if it is still the active one, the agent
/// state settles back to listening. This holds on every exit path,
/// including the owning future being dropped mid-flight.
pub struct Playback {
    id: u64,
    cancel: CancellationToken,
    sink: Arc<dyn AudioSink>,
    session: SessionSlot,
    state: AgentStateCell,
}

impl Playback {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        let mut active = lock_session(&self.session);
        if active.as_ref().map(|s| s.id) != Some(self.id) {
            tracing::debug!(session = self.id, "superseded playback session ended");
            return;
        }
        *active = None;
        // Settled is legal from every state.
        let _ = self.state.apply(Transition::Settled);
        tracing::debug!(session = self.id, "playback session ended");
    }
}

pub struct SpeechPipeline {
    synthesizer: Arc<dyn Synthesizer>,
    transcoder: Arc<dyn Transcoder>,
    sink: RwLock<Option<Arc<dyn AudioSink>>>,
    state: AgentStateCell,
    session: SessionSlot,
    next_session: AtomicU64,
    min_payload_bytes: usize,
    sample_rate: u32,
    samples_per_frame: usize,
}

impl SpeechPipeline {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        transcoder: Arc<dyn Transcoder>,
        state: AgentStateCell,
    ) -> Self {
        Self {
            synthesizer,
            transcoder,
            sink: RwLock::new(None),
            state,
            session: Arc::new(Mutex::new(None)),
            next_session: AtomicU64::new(0),
            min_payload_bytes: DEFAULT_MIN_PAYLOAD_BYTES,
            sample_rate: SAMPLE_RATE,
            samples_per_frame: samples_per_frame(SAMPLE_RATE, FRAME_DURATION_MS),
        }
    }

    /// Builds the HTTP synthesizer and the transcoder matching the
    /// configured encoding.
    pub fn from_config(
        tts: &TtsConfig,
        agent: &AgentConfig,
        state: AgentStateCell,
    ) -> Result<Self, VoiceError> {
        let synthesizer = Arc::new(HttpSynthesizer::new(tts, agent.sample_rate)?);
        let transcoder: Arc<dyn Transcoder> = match tts.encoding {
            TtsEncoding::Mp3 => Arc::new(FfmpegTranscoder::new(
                &tts.ffmpeg_path,
                agent.sample_rate,
            )),
            TtsEncoding::Linear16 => Arc::new(RawPcmTranscoder),
        };

        Ok(Self::new(synthesizer, transcoder, state)
            .with_min_payload_bytes(tts.min_payload_bytes)
            .with_frame_format(agent.sample_rate, agent.frame_ms))
    }

    pub fn with_min_payload_bytes(mut self, bytes: usize) -> Self {
        self.min_payload_bytes = bytes;
        self
    }

    /// Sets the playback rate and frame cadence. A cadence that yields no
    /// samples falls back to one sample per frame.
    pub fn with_frame_format(mut self, sample_rate: u32, frame_ms: u32) -> Self {
        self.sample_rate = sample_rate;
        self.samples_per_frame = samples_per_frame(sample_rate, frame_ms).max(1);
        self
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn register_sink(&self, sink: Arc<dyn AudioSink>) {
        *self
            .sink
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);
    }

    fn sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.sink
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns `true` while a session is running and has not been stopped.
    pub fn is_active(&self) -> bool {
        lock_session(&self.session)
            .as_ref()
            .is_some_and(|s| !s.cancel.is_cancelled())
    }

    /// Stops the active session, if any. Frames already handed to the sink
    /// finish; nothing further is sent.
    pub fn stop(&self) {
        if let Some(active) = lock_session(&self.session).as_ref() {
            if !active.cancel.is_cancelled() {
                tracing::info!(session = active.id, "stopping playback");
                active.cancel.cancel();
            }
        }
    }

    /// Synthesizes and plays `text`. Errors are logged, never returned.
    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        match self.begin() {
            Some(playback) => self.play(playback, text).await,
            None => SpeakOutcome::Skipped,
        }
    }

    /// Starts a session and moves the agent to speaking, without awaiting.
    ///
    /// Any session still in flight is stopped and superseded. Returns `None`
    /// when no sink is registered.
    pub fn begin(&self) -> Option<Playback> {
        let Some(sink) = self.sink() else {
            tracing::warn!("speak requested before an audio sink was registered, skipping");
            return None;
        };

        let mut active = lock_session(&self.session);
        if let Some(previous) = active.take() {
            tracing::info!(session = previous.id, "superseding active playback");
            previous.cancel.cancel();
        }

        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        *active = Some(ActiveSession {
            id,
            cancel: cancel.clone(),
        });
        // SpeechStarted is legal from every state.
        let _ = self.state.apply(Transition::SpeechStarted);

        Some(Playback {
            id,
            cancel,
            sink,
            session: Arc::clone(&self.session),
            state: self.state.clone(),
        })
    }

    /// Runs a session started by [`Self::begin`] to its end.
    pub async fn play(&self, playback: Playback, text: &str) -> SpeakOutcome {
        tracing::info!(session = playback.id, chars = text.len(), "speaking");
        let outcome = self.run(&playback, text).await;

        match outcome {
            SpeakOutcome::Completed { frames } => {
                tracing::info!(session = playback.id, frames, "playback finished");
            }
            SpeakOutcome::Interrupted { frames } => {
                tracing::info!(session = playback.id, frames, "playback interrupted");
            }
            SpeakOutcome::Failed | SpeakOutcome::Skipped => {}
        }

        drop(playback);
        outcome
    }

    async fn run(&self, playback: &Playback, text: &str) -> SpeakOutcome {
        let cancel = &playback.cancel;
        let interrupted = SpeakOutcome::Interrupted { frames: 0 };

        if cancel.is_cancelled() {
            return interrupted;
        }
        let encoded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return interrupted,
            result = self.synthesizer.synthesize(text) => result,
        };
        let encoded = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(session = playback.id, error = %e, "speech synthesis failed");
                return SpeakOutcome::Failed;
            }
        };
        if encoded.len() < self.min_payload_bytes {
            tracing::warn!(
                session = playback.id,
                bytes = encoded.len(),
                min_bytes = self.min_payload_bytes,
                "synthesized payload too small to be audio"
            );
            return SpeakOutcome::Failed;
        }

        if cancel.is_cancelled() {
            return interrupted;
        }
        let pcm = tokio::select! {
            biased;
            _ = cancel.cancelled() => return interrupted,
            result = self.transcoder.to_pcm(encoded) => result,
        };
        let pcm = match pcm {
            Ok(samples) if samples.is_empty() => {
                tracing::warn!(session = playback.id, "transcoded audio is empty");
                return SpeakOutcome::Failed;
            }
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(session = playback.id, error = %e, "transcoding failed");
                return SpeakOutcome::Failed;
            }
        };

        let mut frames = 0;
        for chunk in pcm.chunks(self.samples_per_frame) {
            if cancel.is_cancelled() {
                return SpeakOutcome::Interrupted { frames };
            }
            let frame = AudioFrame::from_chunk(chunk, self.samples_per_frame, self.sample_rate);
            if let Err(e) = playback.sink.push(frame).await {
                tracing::warn!(session = playback.id, frames, error = %e, "audio sink rejected frame");
                return SpeakOutcome::Failed;
            }
            frames += 1;
        }

        SpeakOutcome::Completed { frames }
    }
}
