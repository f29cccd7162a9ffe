//! Deferred transition requests.
//!
//! A state cannot re-enter the machine while the machine is running one of
//! its methods, so requests go through this queue instead. Clones share the
//! same queue; hand one to event handlers or other collaborators that need
//! to trigger transitions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::payload::StatePayload;
use crate::state::{GameState, StateKey};

pub(crate) enum Transition {
    Change {
        key: StateKey,
        payload: Option<StatePayload>,
    },
    Push {
        key: StateKey,
        payload: Option<StatePayload>,
    },
    Pop,
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Change { key, .. } => write!(f, "Change({key})"),
            Transition::Push { key, .. } => write!(f, "Push({key})"),
            Transition::Pop => f.write_str("Pop"),
        }
    }
}

#[derive(Clone, Default)]
pub struct Transitions {
    queue: Arc<Mutex<VecDeque<Transition>>>,
}

impl Transitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a replacing transition to `S`.
    pub fn change<S: GameState>(&self, payload: Option<StatePayload>) {
        self.lock().push_back(Transition::Change {
            key: StateKey::of::<S>(),
            payload,
        });
    }

    /// Request that the current state be suspended and `S` entered.
    pub fn push<S: GameState>(&self, payload: Option<StatePayload>) {
        self.lock().push_back(Transition::Push {
            key: StateKey::of::<S>(),
            payload,
        });
    }

    /// Request a return to the most recently suspended state.
    pub fn pop(&self) {
        self.lock().push_back(Transition::Pop);
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn next(&self) -> Option<Transition> {
        self.lock().pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Transition>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Transitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.lock().iter()).finish()
    }
}
