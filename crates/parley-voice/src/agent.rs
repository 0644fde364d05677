//! Turn-taking coordinator.
//!
//! The agent loop is the single consumer of room audio and final
//! transcripts. It decides when the agent may speak, interrupts it when the
//! user talks over it, and keeps the silence watchdog armed while the user
//! is active.
//!
//! ```text
//! Listening --final transcript--> Processing --playback begins--> Speaking
//!     ^                                                              |
//!     +---------------- playback settles / user interrupts ----------+
//! ```

use crate::config::AgentConfig;
use crate::pipeline::{SpeakOutcome, SpeechPipeline};
use crate::state::AgentStateCell;
use crate::stt::AudioUplink;
use crate::vad::EnergyGate;
use crate::watchdog::{Reminder, SilenceWatchdog};
use async_trait::async_trait;
use parley_types::{AgentState, AudioFrame, Transcript, Transition};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Speaks a fixed line through the pipeline when the room goes quiet.
pub struct SpokenReminder {
    pipeline: Arc<SpeechPipeline>,
    text: String,
}

impl SpokenReminder {
    pub fn new(pipeline: Arc<SpeechPipeline>, text: impl Into<String>) -> Self {
        Self {
            pipeline,
            text: text.into(),
        }
    }
}

#[async_trait]
impl Reminder for SpokenReminder {
    async fn remind(&self) {
        self.pipeline.speak(&self.text).await;
    }
}

pub struct AgentLoop {
    config: AgentConfig,
    state: AgentStateCell,
    pipeline: Arc<SpeechPipeline>,
    watchdog: Arc<SilenceWatchdog>,
    gate: EnergyGate,
    uplink: Arc<dyn AudioUplink>,
}

impl AgentLoop {
    /// Wires the coordinator. `state` must be the same cell the pipeline
    /// was built with.
    pub fn new(
        config: AgentConfig,
        state: AgentStateCell,
        pipeline: Arc<SpeechPipeline>,
        uplink: Arc<dyn AudioUplink>,
    ) -> Self {
        let reminder = Arc::new(SpokenReminder::new(
            Arc::clone(&pipeline),
            config.reminder_text.clone(),
        ));
        let watchdog = SilenceWatchdog::new(config.silence_timeout(), state.clone(), reminder);
        let gate = EnergyGate::new(config.vad_threshold);

        Self {
            config,
            state,
            pipeline,
            watchdog,
            gate,
            uplink,
        }
    }

    pub fn state(&self) -> &AgentStateCell {
        &self.state
    }

    pub fn watchdog(&self) -> &Arc<SilenceWatchdog> {
        &self.watchdog
    }

    /// Processes one inbound room frame.
    ///
    /// Speech while the agent talks interrupts it; speech in any state
    /// re-arms the watchdog. The frame always goes to the transcriber, even
    /// while the agent talks: transcripts that arrive outside `Listening`
    /// are dropped instead, and a muted uplink would let the recognizer
    /// time out.
    pub fn handle_frame(&self, frame: AudioFrame) {
        if self.gate.is_active(&frame) {
            if self.state.is(AgentState::Speaking) {
                tracing::info!(rms = frame.rms(), "user interrupted agent");
                self.pipeline.stop();
                if let Err(e) = self.state.apply(Transition::Interrupted) {
                    tracing::debug!(error = %e, "interruption raced with playback end");
                }
            }
            self.watchdog.arm();
        }

        self.uplink.send_audio(frame.to_le_bytes());
    }

    /// Starts a reply for an actionable transcript received while listening.
    ///
    /// Returns the spawned playback task, or `None` if the transcript was
    /// ignored.
    pub fn handle_transcript(&self, transcript: Transcript) -> Option<JoinHandle<SpeakOutcome>> {
        if !transcript.is_actionable() {
            return None;
        }

        let state = self.state.get();
        if state != AgentState::Listening {
            tracing::info!(state = %state, text = %transcript.text, "dropping transcript, agent holds the turn");
            return None;
        }

        if let Err(e) = self.state.apply(Transition::TranscriptAccepted) {
            tracing::debug!(error = %e, "transcript raced with a state change");
            return None;
        }

        let reply = self.config.reply_for(&transcript.text);
        let Some(playback) = self.pipeline.begin() else {
            let _ = self.state.apply(Transition::Settled);
            return None;
        };

        let pipeline = Arc::clone(&self.pipeline);
        Some(tokio::spawn(async move {
            pipeline.play(playback, &reply).await
        }))
    }

    /// Speaks the configured greeting, if any.
    fn greet(&self) -> Option<JoinHandle<SpeakOutcome>> {
        let greeting = self.config.greeting.clone()?;
        let playback = self.pipeline.begin()?;
        let pipeline = Arc::clone(&self.pipeline);
        Some(tokio::spawn(async move {
            pipeline.play(playback, &greeting).await
        }))
    }

    /// Runs until `shutdown` is cancelled or the frame channel closes.
    ///
    /// Both receivers exist before the greeting starts, so nothing the room
    /// or the transcriber produces during it is lost.
    pub async fn run(
        self,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut transcripts: mpsc::UnboundedReceiver<Transcript>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            vad_threshold = self.gate.threshold(),
            silence_timeout_secs = self.config.silence_timeout_secs,
            "agent loop started"
        );

        self.watchdog.arm();
        self.greet();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("agent loop shutting down");
                    break;
                }
                Some(transcript) = transcripts.recv() => {
                    self.handle_transcript(transcript);
                }
                frame = frames.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => {
                        tracing::info!("room audio ended");
                        break;
                    }
                },
            }
        }

        self.pipeline.stop();
        self.watchdog.disarm();
        tracing::info!("agent loop stopped");
    }
}
