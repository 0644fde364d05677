//! Streaming speech-to-text client that survives idle closes and disconnects.
//!
//! The client owns one WebSocket to the recognizer at a time. Audio is sent
//! as binary little-endian PCM; the recognizer answers with JSON result
//! messages. The backend drops streams that carry no data for about ten
//! seconds, which happens whenever nobody talks, so a keepalive is sent on a
//! fixed period regardless of audio flow. Every close, expected or not, is
//! followed by a reconnect after a fixed delay until [`SttHandle::shutdown`]
//! is called.

use crate::config::SttConfig;
use crate::error::VoiceError;
use futures_util::{SinkExt, StreamExt};
use parley_types::{Transcript, NUM_CHANNELS};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Control message that resets the backend's idle timer.
pub const KEEPALIVE_MESSAGE: &str = r#"{"type":"KeepAlive"}"#;

/// Control message asking the backend to flush and close the stream.
pub const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type AudioSlot = Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>;

/// Anything that accepts raw PCM for transcription.
pub trait AudioUplink: Send + Sync {
    /// Hands `pcm` (s16le) to the transcriber. Never blocks and never fails;
    /// audio that cannot be delivered right now is dropped.
    fn send_audio(&self, pcm: Vec<u8>);
}

/// Entry point for the resilient transcription client.
pub struct TranscriptionClient;

impl TranscriptionClient {
    /// Starts the connection loop and returns a handle to it.
    ///
    /// `on_transcript` is invoked for every final, non-empty transcript, in
    /// the order the backend emits them. Must be called inside a tokio
    /// runtime.
    pub fn start<F>(config: SttConfig, on_transcript: F) -> SttHandle
    where
        F: Fn(Transcript) + Send + Sync + 'static,
    {
        let handle = SttHandle {
            audio: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        };

        let task_handle = handle.clone();
        tokio::spawn(async move {
            run_connection_loop(config, &task_handle, &on_transcript).await;
            task_handle.stopped.cancel();
        });

        handle
    }
}

/// Cloneable handle to a running [`TranscriptionClient`].
#[derive(Debug, Clone)]
pub struct SttHandle {
    audio: AudioSlot,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl SttHandle {
    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Vec<u8>>>> {
        self.audio
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `true` while a stream is open and accepting audio.
    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    /// Requests a deliberate shutdown. The open stream, if any, is closed
    /// and no reconnect follows.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once the connection loop has exited after [`Self::shutdown`].
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }
}

impl AudioUplink for SttHandle {
    fn send_audio(&self, pcm: Vec<u8>) {
        let slot = self.slot();
        let Some(tx) = slot.as_ref() else {
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(pcm) {
            tracing::trace!("transcription audio queue full, dropping chunk");
        }
    }
}

async fn run_connection_loop<F>(config: SttConfig, handle: &SttHandle, on_transcript: &F)
where
    F: Fn(Transcript) + Send + Sync,
{
    let delay = config.reconnect_delay();
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;

        let connected = tokio::select! {
            _ = handle.shutdown.cancelled() => break,
            result = connect(&config) => result,
        };

        match connected {
            Ok(stream) => {
                tracing::info!(attempt, "transcription stream open");
                run_session(stream, &config, handle, on_transcript).await;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "transcription connect failed");
            }
        }

        if handle.shutdown.is_cancelled() {
            break;
        }

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transcription stream closed, reconnecting"
        );

        tokio::select! {
            _ = handle.shutdown.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    tracing::info!("transcription client stopped");
}

/// Builds the connect URL with the fixed audio format and result options.
pub fn listen_url(config: &SttConfig) -> Result<reqwest::Url, VoiceError> {
    let mut url = reqwest::Url::parse(&config.url)
        .map_err(|e| VoiceError::Config(format!("invalid stt.url '{}': {}", config.url, e)))?;

    url.query_pairs_mut()
        .append_pair("encoding", "linear16")
        .append_pair("sample_rate", &config.sample_rate.to_string())
        .append_pair("channels", &NUM_CHANNELS.to_string())
        .append_pair("model", &config.model)
        .append_pair("interim_results", "true")
        .append_pair("endpointing", &config.endpointing_ms.to_string())
        .append_pair("smart_format", "true");

    Ok(url)
}

async fn connect(config: &SttConfig) -> Result<WsStream, VoiceError> {
    let url = listen_url(config)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| VoiceError::Stt(format!("failed to build request: {}", e)))?;

    if !config.api_key.is_empty() {
        let value = HeaderValue::from_str(&format!("Token {}", config.api_key))
            .map_err(|e| VoiceError::Config(format!("invalid stt.api_key: {}", e)))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (stream, _response) = connect_async(request)
        .await
        .map_err(|e| VoiceError::Stt(format!("failed to connect: {}", e)))?;

    Ok(stream)
}

/// Pumps one open stream until it closes or shutdown is requested.
async fn run_session<F>(stream: WsStream, config: &SttConfig, handle: &SttHandle, on_transcript: &F)
where
    F: Fn(Transcript) + Send + Sync,
{
    let (mut write, mut read) = stream.split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(config.audio_queue_frames);
    *handle.slot() = Some(tx);

    let interval = config.keepalive_interval();
    let keepalive = sleep(interval);
    tokio::pin!(keepalive);

    loop {
        tokio::select! {
            _ = handle.shutdown.cancelled() => {
                if let Err(e) = write.send(Message::text(CLOSE_STREAM_MESSAGE)).await {
                    tracing::debug!(error = %e, "failed to send CloseStream");
                }
                let _ = write.close().await;
                break;
            }
            Some(pcm) = rx.recv() => {
                if let Err(e) = write.send(Message::binary(pcm)).await {
                    tracing::warn!(error = %e, "failed to send audio to transcription stream");
                    break;
                }
            }
            () = &mut keepalive => {
                if let Err(e) = write.send(Message::text(KEEPALIVE_MESSAGE)).await {
                    tracing::warn!(error = %e, "failed to send keepalive");
                    break;
                }
                tracing::debug!("sent transcription keepalive");
                keepalive.as_mut().reset(Instant::now() + interval);
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => handle_message(text.as_str(), on_transcript),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "transcription stream closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transcription stream error");
                    break;
                }
                None => break,
            },
        }
    }

    // Audio sent from here on is dropped until the next stream opens.
    *handle.slot() = None;
}

fn handle_message<F>(text: &str, on_transcript: &F)
where
    F: Fn(Transcript),
{
    match parse_transcript(text) {
        Ok(Some(transcript)) if transcript.is_actionable() => {
            tracing::info!(text = %transcript.text, "final transcript");
            on_transcript(transcript);
        }
        Ok(Some(transcript)) => {
            tracing::debug!(text = %transcript.text, "interim transcript");
        }
        Ok(None) => {
            tracing::debug!("ignoring non-result transcription message");
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed transcription message");
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_final: bool,
    channel: Option<ResultChannel>,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Extracts the best alternative from a recognizer message.
///
/// Returns `Ok(None)` for messages that carry no result (metadata,
/// speech-started and utterance-end events).
pub fn parse_transcript(text: &str) -> Result<Option<Transcript>, serde_json::Error> {
    let message: StreamMessage = serde_json::from_str(text)?;

    if matches!(message.kind.as_deref(), Some(kind) if kind != "Results") {
        return Ok(None);
    }

    let best = message
        .channel
        .and_then(|channel| channel.alternatives.into_iter().next());

    Ok(best.map(|alternative| Transcript {
        text: alternative.transcript.trim().to_string(),
        is_final: message.is_final,
    }))
}
