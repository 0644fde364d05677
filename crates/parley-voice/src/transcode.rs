//! Conversion of synthesized audio to playback PCM.

use crate::error::VoiceError;
use async_trait::async_trait;
use parley_types::{pcm_from_le_bytes, NUM_CHANNELS};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Timeout for the transcoder process.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Decodes an encoded audio payload into mono s16 samples at the playback
/// rate.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn to_pcm(&self, encoded: Vec<u8>) -> Result<Vec<i16>, VoiceError>;
}

/// Transcodes through an `ffmpeg` subprocess: payload on stdin, raw s16le
/// on stdout.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    sample_rate: u32,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            binary: binary.into(),
            sample_rate,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_pcm(&self, encoded: Vec<u8>) -> Result<Vec<i16>, VoiceError> {
        let mut command = Command::new(&self.binary);
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-i", "pipe:0"])
            .args(["-f", "s16le", "-acodec", "pcm_s16le"])
            .arg("-ac")
            .arg(NUM_CHANNELS.to_string())
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Transcode(format!("Failed to spawn ffmpeg: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Transcode("Failed to open stdin".to_string()))?;

        // Spawn a task to write to stdin to avoid deadlock if output buffer fills up
        let write_task = tokio::spawn(async move {
            let result = stdin.write_all(&encoded).await;
            drop(stdin); // Close stdin to signal EOF
            result
        });

        let output = tokio::time::timeout(TRANSCODE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Transcode(format!(
                    "ffmpeg timed out after {} seconds",
                    TRANSCODE_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Transcode(format!("Failed to wait for ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Transcode(format!("ffmpeg failed: {}", stderr)));
        }

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Transcode(format!(
                    "Failed to write to ffmpeg stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Transcode(format!("Stdin task failed: {}", e))),
        }

        Ok(pcm_from_le_bytes(&output.stdout))
    }
}

/// Passthrough for backends that already return headerless s16le at the
/// playback rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPcmTranscoder;

#[async_trait]
impl Transcoder for RawPcmTranscoder {
    async fn to_pcm(&self, encoded: Vec<u8>) -> Result<Vec<i16>, VoiceError> {
        Ok(pcm_from_le_bytes(&encoded))
    }
}
