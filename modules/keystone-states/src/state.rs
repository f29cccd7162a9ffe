//! The state lifecycle contract.

use std::any::TypeId;
use std::fmt;

use async_trait::async_trait;
use keystone_common::short_type_name;
use tokio_util::sync::CancellationToken;

use crate::payload::StatePayload;
use crate::transitions::Transitions;

/// A registered behavior unit.
///
/// Synchronous states simply never await inside `enter`/`exit`; the machine
/// drives both kinds the same way. `enter` runs on every activation,
/// including when a suspended state is resumed by a pop (with no payload).
#[async_trait]
pub trait GameState: Send + 'static {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per tick while this state is current and fully entered.
    fn update(&mut self, _cx: &StateContext) {}

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Type identity of a registered state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateKey {
    id: TypeId,
    name: &'static str,
}

impl StateKey {
    pub fn of<S: GameState>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: short_type_name::<S>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// What a state sees of the machine while one of its methods runs.
#[derive(Debug, Clone)]
pub struct StateContext {
    state: StateKey,
    transitions: Transitions,
    cancel: CancellationToken,
}

impl StateContext {
    pub(crate) fn new(state: StateKey, transitions: Transitions, cancel: CancellationToken) -> Self {
        Self {
            state,
            transitions,
            cancel,
        }
    }

    /// The state this context was built for.
    pub fn state(&self) -> StateKey {
        self.state
    }

    /// Queue for requesting further transitions.
    pub fn transitions(&self) -> &Transitions {
        &self.transitions
    }

    /// Fires when the host shuts the machine down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}
