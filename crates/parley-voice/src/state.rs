//! Shared handle to the agent's turn-taking state.

use crate::error::VoiceError;
use parley_types::{AgentState, Transition};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Default capacity for the state-change broadcast channel.
const DEFAULT_STATE_BROADCAST_CAPACITY: usize = 64;

/// Emitted whenever a transition changes the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: AgentState,
    pub to: AgentState,
    pub transition: Transition,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<AgentState>,
    changes: broadcast::Sender<StateChange>,
}

/// Cloneable handle to the single [`AgentState`] of a running agent.
///
/// The state can only move through [`AgentStateCell::apply`], which checks
/// the transition against [`AgentState::apply`].
#[derive(Debug, Clone)]
pub struct AgentStateCell {
    inner: Arc<Inner>,
}

impl Default for AgentStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentStateCell {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_STATE_BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(AgentState::default()),
                changes,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> AgentState {
        *self.lock()
    }

    pub fn is(&self, state: AgentState) -> bool {
        self.get() == state
    }

    /// Applies `transition` and returns the new state.
    ///
    /// An illegal transition leaves the state untouched.
    pub fn apply(&self, transition: Transition) -> Result<AgentState, VoiceError> {
        let mut state = self.lock();
        let from = *state;
        let to = from.apply(transition)?;
        *state = to;

        if from != to {
            tracing::info!(from = %from, to = %to, ?transition, "agent state changed");
            // Sent under the lock so observers see changes in order.
            let _ = self.inner.changes.send(StateChange {
                from,
                to,
                transition,
            });
        }

        Ok(to)
    }

    /// Subscribes to state changes made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.changes.subscribe()
    }
}
