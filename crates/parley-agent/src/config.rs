//! Agent configuration loading from file and environment variables.

use parley_voice::{AgentConfig, LiveKitConfig, SttConfig, TtsConfig};
use serde::Deserialize;
use thiserror::Error;

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// LiveKit server and the room the agent joins.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Streaming transcription backend.
    #[serde(default)]
    pub stt: SttConfig,

    /// Speech synthesis backend.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Turn-taking behaviour.
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "parley_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but cannot run.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Checks the settings that would otherwise fail only once audio flows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.livekit.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "livekit.url is required (or set LIVEKIT_URL)".to_string(),
            ));
        }

        self.stt
            .validate()
            .and_then(|()| self.agent.validate())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        // Room audio is forwarded to the recognizer as-is.
        if self.stt.sample_rate != self.agent.sample_rate {
            return Err(ConfigError::Invalid(format!(
                "stt.sample_rate ({}) must match agent.sample_rate ({})",
                self.stt.sample_rate, self.agent.sample_rate
            )));
        }

        Ok(())
    }
}

/// Where a loaded [`Config`] came from, before environment overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    /// No path was given or the file does not exist.
    Defaults,
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides (see [`apply_env_overrides`]).
///
/// Runs before logging is set up, so the caller reports the origin.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<(Config, ConfigOrigin), ConfigError> {
    let (mut config, origin) = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => (toml::from_str(&contents)?, ConfigOrigin::File),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Config::default(), ConfigOrigin::Defaults)
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => (Config::default(), ConfigOrigin::Defaults),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok((config, origin))
}

/// Applies overrides from `lookup`, normally the process environment:
///
/// - `PARLEY_LOG_LEVEL` overrides `logging.level`
/// - `PARLEY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override the
///   matching `livekit` fields
/// - `PARLEY_ROOM` overrides `livekit.room`
/// - `PARLEY_IDENTITY` overrides `livekit.identity`
/// - `DEEPGRAM_API_KEY` overrides both `stt.api_key` and `tts.api_key`
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("PARLEY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("PARLEY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = lookup("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = lookup("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(room) = lookup("PARLEY_ROOM") {
        config.livekit.room = room;
    }
    if let Some(identity) = lookup("PARLEY_IDENTITY") {
        config.livekit.identity = identity;
    }
    if let Some(key) = lookup("DEEPGRAM_API_KEY") {
        config.stt.api_key = key.clone();
        config.tts.api_key = key;
    }
}
