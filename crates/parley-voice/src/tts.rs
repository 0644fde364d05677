use crate::config::{TtsConfig, TtsEncoding};
use crate::error::VoiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Turns text into encoded audio bytes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns the backend's audio payload for `text`, still in the
    /// backend's encoding.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Synthesizer backed by an HTTP speech endpoint.
///
/// Sends `POST <url>?model=<model>` with a JSON `{"text": ...}` body and
/// reads the whole audio body back.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: reqwest::Url,
    api_key: String,
    timeout: Duration,
}

impl HttpSynthesizer {
    pub fn new(config: &TtsConfig, sample_rate: u32) -> Result<Self, VoiceError> {
        let mut url = reqwest::Url::parse(&config.url)
            .map_err(|e| VoiceError::Config(format!("invalid tts.url '{}': {}", config.url, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("model", &config.model);
            if config.encoding == TtsEncoding::Linear16 {
                query
                    .append_pair("encoding", "linear16")
                    .append_pair("sample_rate", &sample_rate.to_string())
                    .append_pair("container", "none");
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Tts(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let mut request = self
            .client
            .post(self.url.clone())
            .json(&SpeakRequest { text });
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Token {}", self.api_key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                VoiceError::Tts(format!(
                    "TTS request timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            } else {
                VoiceError::Tts(format!("TTS request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "TTS backend returned {}: {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Tts(format!("Failed to read TTS response: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
