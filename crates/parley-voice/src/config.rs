use crate::error::VoiceError;
use parley_types::{FRAME_DURATION_MS, SAMPLE_RATE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The backend closes idle streams after this long; keepalives must be sent
/// strictly more often.
pub const STT_IDLE_CLOSE_SECS: u64 = 10;

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_room() -> String {
    "parley".to_string()
}

fn default_identity() -> String {
    "parley-agent".to_string()
}

fn default_participant_name() -> String {
    "Parley".to_string()
}

fn default_stt_url() -> String {
    "wss://api.deepgram.com/v1/listen".to_string()
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_endpointing_ms() -> u32 {
    300
}

fn default_keepalive_secs() -> u64 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_audio_queue_frames() -> usize {
    256
}

fn default_tts_url() -> String {
    "https://api.deepgram.com/v1/speak".to_string()
}

fn default_tts_model() -> String {
    "aura-asteria-en".to_string()
}

fn default_tts_timeout_secs() -> u64 {
    30
}

fn default_min_payload_bytes() -> usize {
    1024
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_vad_threshold() -> f64 {
    300.0
}

fn default_silence_timeout_secs() -> u64 {
    20
}

fn default_frame_ms() -> u32 {
    FRAME_DURATION_MS
}

fn default_reply_template() -> String {
    "You said: {text}".to_string()
}

fn default_reminder_text() -> String {
    "Are you still there? I'm listening whenever you're ready.".to_string()
}

fn default_greeting() -> Option<String> {
    Some("Hello! I'm listening.".to_string())
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Server URL, used both for the RTC connection and the server API.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for the agent's join token. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Room the agent joins.
    #[serde(default = "default_room")]
    pub room: String,
    /// Participant identity the agent joins as.
    #[serde(default = "default_identity")]
    pub identity: String,
    /// Display name shown to other participants.
    #[serde(default = "default_participant_name")]
    pub name: String,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
            room: default_room(),
            identity: default_identity(),
            name: default_participant_name(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("room", &self.room)
            .field("identity", &self.identity)
            .field("name", &self.name)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }
}

/// Streaming transcription backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// WebSocket endpoint of the streaming recognizer.
    #[serde(default = "default_stt_url")]
    pub url: String,
    /// Sent as `Authorization: Token <api_key>` when non-empty.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
    /// Declared at connect time; must match the audio sent afterwards.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Server-side endpointing silence in milliseconds.
    #[serde(default = "default_endpointing_ms")]
    pub endpointing_ms: u32,
    /// Seconds between keepalive messages while the stream is open.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Fixed delay before reconnecting after any close.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Audio chunks queued for the open socket before new ones are dropped.
    #[serde(default = "default_audio_queue_frames")]
    pub audio_queue_frames: usize,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: default_stt_url(),
            api_key: String::new(),
            model: default_stt_model(),
            sample_rate: default_sample_rate(),
            endpointing_ms: default_endpointing_ms(),
            keepalive_secs: default_keepalive_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            audio_queue_frames: default_audio_queue_frames(),
        }
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("sample_rate", &self.sample_rate)
            .field("endpointing_ms", &self.endpointing_ms)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("audio_queue_frames", &self.audio_queue_frames)
            .finish()
    }
}

impl SttConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Checks that the keepalive fires inside the backend's idle window.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.keepalive_secs == 0 || self.keepalive_secs >= STT_IDLE_CLOSE_SECS {
            return Err(VoiceError::Config(format!(
                "stt.keepalive_secs must be between 1 and {}",
                STT_IDLE_CLOSE_SECS - 1
            )));
        }
        if self.sample_rate == 0 {
            return Err(VoiceError::Config(
                "stt.sample_rate must be positive".to_string(),
            ));
        }
        if self.audio_queue_frames == 0 {
            return Err(VoiceError::Config(
                "stt.audio_queue_frames must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Audio format requested from the synthesis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsEncoding {
    /// Compressed audio, transcoded locally through ffmpeg.
    #[default]
    Mp3,
    /// Headerless s16le at the playback rate; no transcoding needed.
    Linear16,
}

/// Speech synthesis backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_url")]
    pub url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default)]
    pub encoding: TtsEncoding,
    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
    /// Payloads smaller than this are treated as an error page, not audio.
    #[serde(default = "default_min_payload_bytes")]
    pub min_payload_bytes: usize,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            api_key: String::new(),
            model: default_tts_model(),
            encoding: TtsEncoding::default(),
            timeout_secs: default_tts_timeout_secs(),
            min_payload_bytes: default_min_payload_bytes(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("encoding", &self.encoding)
            .field("timeout_secs", &self.timeout_secs)
            .field("min_payload_bytes", &self.min_payload_bytes)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .finish()
    }
}

impl TtsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Turn-taking behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// RMS (i16 scale) at or above which a frame counts as speech.
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f64,
    /// Idle period before the reminder is spoken.
    #[serde(default = "default_silence_timeout_secs")]
    pub silence_timeout_secs: u64,
    /// Playback sample rate; must match the room's audio source.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Duration of each frame pushed to the sink.
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,
    /// Reply spoken for each final transcript; `{text}` is replaced by it.
    #[serde(default = "default_reply_template")]
    pub reply_template: String,
    #[serde(default = "default_reminder_text")]
    pub reminder_text: String,
    /// Spoken once after the agent joins, if set.
    #[serde(default = "default_greeting")]
    pub greeting: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            vad_threshold: default_vad_threshold(),
            silence_timeout_secs: default_silence_timeout_secs(),
            sample_rate: default_sample_rate(),
            frame_ms: default_frame_ms(),
            reply_template: default_reply_template(),
            reminder_text: default_reminder_text(),
            greeting: default_greeting(),
        }
    }
}

impl AgentConfig {
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_secs(self.silence_timeout_secs)
    }

    /// Renders the reply template for a transcript.
    pub fn reply_for(&self, text: &str) -> String {
        self.reply_template.replace("{text}", text.trim())
    }

    pub fn validate(&self) -> Result<(), VoiceError> {
        if !self.vad_threshold.is_finite() || self.vad_threshold <= 0.0 {
            return Err(VoiceError::Config(
                "agent.vad_threshold must be a positive number".to_string(),
            ));
        }
        if self.silence_timeout_secs == 0 {
            return Err(VoiceError::Config(
                "agent.silence_timeout_secs must be positive".to_string(),
            ));
        }
        if parley_types::samples_per_frame(self.sample_rate, self.frame_ms) == 0 {
            return Err(VoiceError::Config(
                "agent.sample_rate and agent.frame_ms must yield at least one sample per frame"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
