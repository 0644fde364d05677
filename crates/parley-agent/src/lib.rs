//! Parley agent process: configuration, room transport and the wiring that
//! turns them into a running voice agent.

pub mod config;
pub mod error;
pub mod room;

pub use config::{load_config, Config, ConfigError, ConfigOrigin, LoggingConfig};
pub use error::AgentError;

use parley_voice::{AgentLoop, AgentStateCell, SpeechPipeline, TranscriptionClient};
use room::RoomSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for the transcription stream to close.
const STT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the agent in a joined room until `shutdown` is cancelled or the
/// room's audio ends, then tears everything down in order: playback,
/// transcription, room.
pub async fn run_agent(
    config: &Config,
    room: RoomSession,
    shutdown: CancellationToken,
) -> Result<(), AgentError> {
    let RoomSession {
        frames,
        sink,
        closer,
    } = room;

    let state = AgentStateCell::new();
    let pipeline = Arc::new(SpeechPipeline::from_config(
        &config.tts,
        &config.agent,
        state.clone(),
    )?);
    pipeline.register_sink(sink);

    let (transcript_tx, transcripts) = mpsc::unbounded_channel();
    let stt = TranscriptionClient::start(config.stt.clone(), move |transcript| {
        let _ = transcript_tx.send(transcript);
    });

    let agent = AgentLoop::new(
        config.agent.clone(),
        state,
        pipeline,
        Arc::new(stt.clone()),
    );
    agent.run(frames, transcripts, shutdown).await;

    stt.shutdown();
    if tokio::time::timeout(STT_CLOSE_TIMEOUT, stt.stopped())
        .await
        .is_err()
    {
        tracing::warn!("transcription stream did not close in time");
    }

    closer.close().await;
    tracing::info!("agent stopped");
    Ok(())
}
