//! Room transport: remote audio in, agent voice out.
//!
//! [`connect`] joins a LiveKit room, publishes the agent's audio track and
//! forwards every subscribed remote audio track into one frame channel. The
//! WebRTC stack is only compiled with the `livekit-rtc` feature; without it,
//! `connect` fails and the agent exits.

use crate::error::AgentError;
use parley_types::AudioFrame;
use parley_voice::{AgentConfig, AudioSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Inbound frames buffered before the room side waits on the coordinator.
pub const INBOUND_QUEUE_FRAMES: usize = 100;

/// A joined room, split into the parts the agent wires up separately.
pub struct RoomSession {
    /// Remote participants' audio at the agent's sample rate.
    pub frames: mpsc::Receiver<AudioFrame>,
    /// The agent's published audio track.
    pub sink: Arc<dyn AudioSink>,
    pub closer: RoomCloser,
}

/// Leaves the room once the agent is done with it.
pub struct RoomCloser {
    close: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RoomCloser {
    /// `task` must exit soon after `close` is cancelled.
    pub fn new(close: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            close,
            task: Some(task),
        }
    }

    /// For transports with no background work to stop.
    pub fn detached() -> Self {
        Self {
            close: CancellationToken::new(),
            task: None,
        }
    }

    pub async fn close(self) {
        self.close.cancel();
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "room task ended abnormally");
            }
        }
    }
}

#[cfg(feature = "livekit-rtc")]
pub use rtc::connect;

/// Always fails: this build has no WebRTC stack to join with.
#[cfg(not(feature = "livekit-rtc"))]
pub async fn connect(url: &str, _token: &str, _agent: &AgentConfig) -> Result<RoomSession, AgentError> {
    Err(AgentError::Room(format!(
        "cannot join {}: built without the livekit-rtc feature, rebuild with `--features livekit-rtc`",
        url
    )))
}

#[cfg(feature = "livekit-rtc")]
mod rtc {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use livekit::prelude::*;
    use livekit::webrtc::audio_frame::AudioFrame as RtcAudioFrame;
    use livekit::webrtc::audio_source::native::NativeAudioSource;
    use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
    use livekit::webrtc::audio_stream::native::NativeAudioStream;
    use parley_types::NUM_CHANNELS;
    use parley_voice::VoiceError;
    use std::borrow::Cow;

    /// Publishes frames through a native source. `capture_frame` waits while
    /// the source's queue is full, which paces playback in real time.
    struct TrackSink {
        source: NativeAudioSource,
    }

    #[async_trait]
    impl AudioSink for TrackSink {
        async fn push(&self, frame: AudioFrame) -> Result<(), VoiceError> {
            let sample_rate = frame.sample_rate();
            let samples_per_channel = frame.samples_per_channel() as u32;
            let frame = RtcAudioFrame {
                data: Cow::Owned(frame.into_samples()),
                sample_rate,
                num_channels: NUM_CHANNELS,
                samples_per_channel,
            };
            self.source
                .capture_frame(&frame)
                .await
                .map_err(|e| VoiceError::Sink(e.to_string()))
        }
    }

    /// Joins the room at `url` with `token`.
    pub async fn connect(
        url: &str,
        token: &str,
        agent: &AgentConfig,
    ) -> Result<RoomSession, AgentError> {
        let (room, events) = Room::connect(url, token, RoomOptions::default())
            .await
            .map_err(|e| AgentError::Room(format!("failed to connect to {}: {}", url, e)))?;
        tracing::info!(room = %room.name(), "joined room");

        // Two frames of queue keeps interruption latency near one frame.
        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            agent.sample_rate,
            NUM_CHANNELS,
            agent.frame_ms * 2,
        );
        let track = LocalAudioTrack::create_audio_track(
            "parley-voice",
            RtcAudioSource::Native(source.clone()),
        );
        room.local_participant()
            .publish_track(
                LocalTrack::Audio(track),
                TrackPublishOptions {
                    source: TrackSource::Microphone,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AgentError::Room(format!("failed to publish audio track: {}", e)))?;
        tracing::info!("published agent audio track");

        let (frames_tx, frames) = mpsc::channel(INBOUND_QUEUE_FRAMES);
        let close = CancellationToken::new();
        let task = tokio::spawn(pump_events(
            room,
            events,
            frames_tx,
            agent.sample_rate,
            close.clone(),
        ));

        Ok(RoomSession {
            frames,
            sink: Arc::new(TrackSink { source }),
            closer: RoomCloser::new(close, task),
        })
    }

    async fn pump_events(
        room: Room,
        mut events: mpsc::UnboundedReceiver<RoomEvent>,
        frames: mpsc::Sender<AudioFrame>,
        sample_rate: u32,
        close: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = close.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(RoomEvent::TrackSubscribed {
                    track: RemoteTrack::Audio(track),
                    participant,
                    ..
                }) => {
                    tracing::info!(participant = ?participant.identity(), "subscribed to remote audio");
                    tokio::spawn(forward_audio(
                        track,
                        frames.clone(),
                        sample_rate,
                        close.clone(),
                    ));
                }
                Some(RoomEvent::ParticipantConnected(participant)) => {
                    tracing::info!(participant = ?participant.identity(), "participant joined");
                }
                Some(RoomEvent::ParticipantDisconnected(participant)) => {
                    tracing::info!(participant = ?participant.identity(), "participant left");
                }
                Some(RoomEvent::Disconnected { reason }) => {
                    tracing::warn!(?reason, "disconnected from room");
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }

        // Forwarders stop on the same token; closing the room ends their streams.
        close.cancel();
        if let Err(e) = room.close().await {
            tracing::debug!(error = %e, "room close failed");
        }
        tracing::info!("left room");
    }

    async fn forward_audio(
        track: RemoteAudioTrack,
        frames: mpsc::Sender<AudioFrame>,
        sample_rate: u32,
        close: CancellationToken,
    ) {
        let mut stream =
            NativeAudioStream::new(track.rtc_track(), sample_rate as i32, NUM_CHANNELS as i32);

        loop {
            let frame = tokio::select! {
                _ = close.cancelled() => break,
                frame = stream.next() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            let frame = AudioFrame::new(frame.data.to_vec(), frame.sample_rate);
            if frames.send(frame).await.is_err() {
                break;
            }
        }

        tracing::debug!("remote audio track ended");
    }
}
