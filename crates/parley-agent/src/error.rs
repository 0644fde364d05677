use crate::config::ConfigError;
use parley_voice::VoiceError;
use thiserror::Error;

/// Errors that stop the agent process.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    /// The room could not be joined or the agent's track not published.
    #[error("room error: {0}")]
    Room(String),
}
