use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parley_agent::room::{RoomCloser, RoomSession};
use parley_agent::{run_agent, Config};
use parley_types::{AudioFrame, SAMPLES_PER_FRAME, SAMPLE_RATE};
use parley_voice::{AudioSink, TtsEncoding, VoiceError};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CollectingSink {
    frames: Mutex<Vec<AudioFrame>>,
}

#[async_trait]
impl AudioSink for CollectingSink {
    async fn push(&self, frame: AudioFrame) -> Result<(), VoiceError> {
        sleep(Duration::from_millis(1)).await;
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}

/// Recognizer that emits one final transcript per connection and reports
/// everything the client sends.
async fn mock_recognizer(transcript: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<Message>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let result = format!(
                r#"{{"type":"Results","is_final":true,"channel":{{"alternatives":[{{"transcript":"{}"}}]}}}}"#,
                transcript
            );
            let _ = ws.send(Message::text(result)).await;

            while let Some(Ok(message)) = ws.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
                let _ = seen_tx.send(message);
            }
        }
    });

    (addr, seen)
}

/// Speech backend answering every request with `pcm` as raw linear16.
async fn mock_speaker(pcm: Vec<u8>) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (bodies_tx, bodies) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // Headers and the small JSON body arrive before the client waits.
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if n == 0 || buf.ends_with(b"}") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&buf).to_string();
            let body = request
                .split("\r\n\r\n")
                .nth(1)
                .unwrap_or_default()
                .to_string();
            let _ = bodies_tx.send(body);

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: audio/l16\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                pcm.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&pcm).await.unwrap();
            let _ = stream.shutdown().await;
        }
    });

    (addr, bodies)
}

fn config(stt: SocketAddr, tts: SocketAddr) -> Config {
    let mut config = Config::default();
    config.livekit.url = "ws://127.0.0.1:7880".to_string();
    config.stt.url = format!("ws://{}/v1/listen", stt);
    config.stt.keepalive_secs = 1;
    config.stt.reconnect_delay_ms = 100;
    config.tts.url = format!("http://{}/v1/speak", tts);
    config.tts.encoding = TtsEncoding::Linear16;
    config.agent.greeting = None;
    config
}

fn fake_room(sink: Arc<CollectingSink>) -> (RoomSession, mpsc::Sender<AudioFrame>) {
    let (frames_tx, frames) = mpsc::channel(16);
    let room = RoomSession {
        frames,
        sink,
        closer: RoomCloser::detached(),
    };
    (room, frames_tx)
}

#[tokio::test]
async fn test_transcript_is_answered_through_the_room() {
    // 100 ms of audio: ten 10 ms frames.
    let pcm: Vec<u8> = std::iter::repeat(1_000i16)
        .take(SAMPLE_RATE as usize / 10)
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let (stt_addr, mut stt_seen) = mock_recognizer("hello").await;
    let (tts_addr, mut tts_bodies) = mock_speaker(pcm).await;

    let sink = Arc::new(CollectingSink::default());
    let (room, frames_tx) = fake_room(sink.clone());
    let shutdown = CancellationToken::new();
    let config = config(stt_addr, tts_addr);

    let agent = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { run_agent(&config, room, shutdown).await }
    });

    let body = timeout(WAIT, tts_bodies.recv()).await.unwrap().unwrap();
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["text"], "You said: hello");

    timeout(WAIT, async {
        while sink.frames.lock().unwrap().len() < 10 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reply never reached the room");
    assert!(sink
        .frames
        .lock()
        .unwrap()
        .iter()
        .all(|f| f.samples_per_channel() == SAMPLES_PER_FRAME));

    // Room audio still flows to the recognizer.
    frames_tx
        .send(AudioFrame::new(vec![5; SAMPLES_PER_FRAME], SAMPLE_RATE))
        .await
        .unwrap();
    let forwarded = timeout(WAIT, async {
        loop {
            match stt_seen.recv().await {
                Some(Message::Binary(data)) => return data.len(),
                Some(_) => continue,
                None => panic!("recognizer stream ended"),
            }
        }
    })
    .await
    .expect("audio never reached the recognizer");
    assert_eq!(forwarded, SAMPLES_PER_FRAME * 2);

    shutdown.cancel();
    timeout(WAIT, agent)
        .await
        .expect("agent did not stop")
        .unwrap()
        .unwrap();

    let close_stream = timeout(WAIT, async {
        loop {
            match stt_seen.recv().await {
                Some(Message::Text(text)) if text.as_str().contains("CloseStream") => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(close_stream, "recognizer never saw CloseStream");
}

#[tokio::test]
async fn test_agent_stops_when_room_audio_ends() {
    let (stt_addr, _stt_seen) = mock_recognizer("ignored").await;
    let (tts_addr, _tts_bodies) = mock_speaker(Vec::new()).await;

    let sink = Arc::new(CollectingSink::default());
    let (room, frames_tx) = fake_room(sink);
    let config = config(stt_addr, tts_addr);

    drop(frames_tx);
    timeout(WAIT, run_agent(&config, room, CancellationToken::new()))
        .await
        .expect("agent did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_invalid_tts_url_fails_startup() {
    let (stt_addr, _stt_seen) = mock_recognizer("ignored").await;
    let mut config = config(stt_addr, "127.0.0.1:9".parse().unwrap());
    config.tts.url = "not a url".to_string();

    let (room, _frames_tx) = fake_room(Arc::new(CollectingSink::default()));
    let result = run_agent(&config, room, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(parley_agent::AgentError::Voice(VoiceError::Config(_)))
    ));
}
