//! Turn-taking state and its legal transitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who currently holds the conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    /// Waiting for the user; final transcripts are accepted.
    #[default]
    Listening,
    /// A transcript was accepted and a reply is being prepared.
    Processing,
    /// The agent is producing audio.
    Speaking,
}

/// The only operations that change an [`AgentState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transition {
    /// A final transcript was accepted for a reply.
    TranscriptAccepted,
    /// A playback session began producing audio.
    SpeechStarted,
    /// The user spoke over the agent.
    Interrupted,
    /// A playback session ended, for whatever reason.
    Settled,
}

/// Returned when a transition is not legal from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {transition:?} from {from}")]
pub struct InvalidTransition {
    pub from: AgentState,
    pub transition: Transition,
}

impl AgentState {
    /// Returns the string label for this state.
    pub fn label(self) -> &'static str {
        match self {
            Self::Listening => "LISTENING",
            Self::Processing => "PROCESSING",
            Self::Speaking => "SPEAKING",
        }
    }

    /// Computes the state reached by applying `transition`.
    ///
    /// `Settled` is legal from every state so that any playback outcome can
    /// restore listening. `SpeechStarted` is legal from `Speaking` because a
    /// new playback session supersedes the one in flight.
    pub fn apply(self, transition: Transition) -> Result<Self, InvalidTransition> {
        use AgentState::*;
        use Transition::*;

        match (self, transition) {
            (Listening, TranscriptAccepted) => Ok(Processing),
            (Listening | Processing | Speaking, SpeechStarted) => Ok(Speaking),
            (Speaking, Interrupted) => Ok(Listening),
            (_, Settled) => Ok(Listening),
            (from, transition) => Err(InvalidTransition { from, transition }),
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
