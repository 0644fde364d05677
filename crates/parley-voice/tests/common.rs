#![allow(dead_code)]

use async_trait::async_trait;
use parley_types::{AudioFrame, SAMPLES_PER_FRAME, SAMPLE_RATE};
use parley_voice::{
    AgentStateCell, AudioSink, AudioUplink, RawPcmTranscoder, SpeechPipeline, Synthesizer,
    VoiceError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// s16le bytes for `samples` samples of a constant `amplitude`.
pub fn pcm_bytes(samples: usize, amplitude: i16) -> Vec<u8> {
    std::iter::repeat(amplitude)
        .take(samples)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

pub fn loud_frame() -> AudioFrame {
    AudioFrame::new(vec![2_000; SAMPLES_PER_FRAME], SAMPLE_RATE)
}

pub fn quiet_frame() -> AudioFrame {
    AudioFrame::new(vec![20; SAMPLES_PER_FRAME], SAMPLE_RATE)
}

/// Returns a fixed payload after an optional delay and records every text.
pub struct FixedSynthesizer {
    payload: Vec<u8>,
    delay: Duration,
    texts: Mutex<Vec<String>>,
}

impl FixedSynthesizer {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            delay: Duration::ZERO,
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.texts.lock().unwrap().len()
    }
}

#[async_trait]
impl Synthesizer for FixedSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        self.texts.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.payload.clone())
    }
}

/// Takes one frame per `pace`, like a real-time audio source.
pub struct RecordingSink {
    pace: Duration,
    frames: Mutex<Vec<AudioFrame>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new(pace: Duration) -> Self {
        Self {
            pace,
            frames: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let sink = Self::new(Duration::ZERO);
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn push(&self, frame: AudioFrame) -> Result<(), VoiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Sink("source closed".to_string()));
        }
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingUplink {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl RecordingUplink {
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }
}

impl AudioUplink for RecordingUplink {
    fn send_audio(&self, pcm: Vec<u8>) {
        self.chunks.lock().unwrap().push(pcm);
    }
}

pub struct Harness {
    pub state: AgentStateCell,
    pub synthesizer: Arc<FixedSynthesizer>,
    pub sink: Arc<RecordingSink>,
    pub pipeline: Arc<SpeechPipeline>,
}

/// A pipeline over raw PCM with a 10 ms paced sink already registered.
pub fn harness(synthesizer: FixedSynthesizer) -> Harness {
    let state = AgentStateCell::new();
    let synthesizer = Arc::new(synthesizer);
    let sink = Arc::new(RecordingSink::new(Duration::from_millis(10)));
    let pipeline = SpeechPipeline::new(
        synthesizer.clone(),
        Arc::new(RawPcmTranscoder),
        state.clone(),
    );
    pipeline.register_sink(sink.clone());

    Harness {
        state,
        synthesizer,
        sink,
        pipeline: Arc::new(pipeline),
    }
}
