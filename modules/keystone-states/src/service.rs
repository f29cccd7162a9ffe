//! The state coordinator.

use std::any::TypeId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keystone_events::Dispatcher;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{StateError, StateResult};
use crate::events::{StateEntered, StateExited, StateMachineEvent};
use crate::payload::StatePayload;
use crate::state::{GameState, StateContext, StateKey};
use crate::transitions::{Transition, Transitions};

/// A batch of states for [`GameStateService::register_states`].
#[derive(Default)]
pub struct StateSet {
    states: Vec<(StateKey, Box<dyn GameState>)>,
}

impl StateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: GameState>(mut self, state: S) -> Self {
        self.states.push((StateKey::of::<S>(), Box::new(state)));
        self
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl fmt::Debug for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.states.iter().map(|(key, _)| key))
            .finish()
    }
}

struct Registered {
    key: StateKey,
    state: Box<dyn GameState>,
}

#[derive(Debug, Clone, Copy)]
struct Active {
    key: StateKey,
    /// Set once `enter` has completed; updates are withheld until then.
    ready: bool,
}

/// Registers states and drives transitions between them.
///
/// Exactly one state is current (or none before the first transition).
/// Every deactivation runs `exit`, including a push; every activation runs
/// `enter`, including a resume by pop.
pub struct GameStateService {
    states: HashMap<TypeId, Registered>,
    current: Option<Active>,
    stack: Vec<StateKey>,
    transitions: Transitions,
    cancel: CancellationToken,
    announcer: Option<Arc<Dispatcher<StateMachineEvent>>>,
}

impl GameStateService {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            current: None,
            stack: Vec::new(),
            transitions: Transitions::new(),
            cancel: CancellationToken::new(),
            announcer: None,
        }
    }

    /// Tie transitions to a host-owned cancellation scope.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Announce every enter/exit on `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher<StateMachineEvent>>) -> Self {
        self.announcer = Some(dispatcher);
        self
    }

    /// A handle for requesting transitions from outside the machine.
    pub fn transitions(&self) -> Transitions {
        self.transitions.clone()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a single state. The first registration of a type wins.
    pub fn register<S: GameState>(&mut self, state: S) -> bool {
        self.insert(StateKey::of::<S>(), Box::new(state))
    }

    /// Register a batch of states; returns how many were new.
    pub fn register_states(&mut self, states: StateSet) -> usize {
        states
            .states
            .into_iter()
            .map(|(key, state)| self.insert(key, state))
            .filter(|added| *added)
            .count()
    }

    fn insert(&mut self, key: StateKey, state: Box<dyn GameState>) -> bool {
        match self.states.entry(key.id()) {
            Entry::Occupied(_) => {
                warn!(state = key.name(), "State {key} is already registered.");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Registered { key, state });
                debug!(state = key.name(), "Registered state");
                true
            }
        }
    }

    pub fn is_registered<S: GameState>(&self) -> bool {
        self.states.contains_key(&TypeId::of::<S>())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn current_state(&self) -> Option<StateKey> {
        self.current.map(|active| active.key)
    }

    pub fn current_state_name(&self) -> Option<&'static str> {
        self.current_state().map(|key| key.name())
    }

    pub fn is_current<S: GameState>(&self) -> bool {
        self.current_state() == Some(StateKey::of::<S>())
    }

    /// Whether the current state has finished entering.
    pub fn is_ready(&self) -> bool {
        self.current.is_some_and(|active| active.ready)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Suspended state names, bottom of the stack first.
    pub fn suspended(&self) -> Vec<&'static str> {
        self.stack.iter().map(|key| key.name()).collect()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Replace the current state with `S`. The suspend stack is untouched.
    pub async fn change_state<S: GameState>(&mut self, payload: Option<StatePayload>) -> StateResult<()> {
        let result = self.replace(StateKey::of::<S>(), payload).await;
        self.process_transitions().await;
        result
    }

    /// Exit the current state, suspend it, and enter `S`.
    pub async fn push_state<S: GameState>(&mut self, payload: Option<StatePayload>) -> StateResult<()> {
        let result = self.push(StateKey::of::<S>(), payload).await;
        self.process_transitions().await;
        result
    }

    /// Exit the current state and re-enter the most recently suspended one.
    pub async fn pop_state(&mut self) -> StateResult<()> {
        let result = self.pop().await;
        self.process_transitions().await;
        result
    }

    /// Apply queued transition requests in order. Failures are logged; a
    /// cancellation stops processing and leaves the rest queued.
    pub async fn process_transitions(&mut self) -> usize {
        let mut applied = 0;
        while let Some(request) = self.transitions.next() {
            debug!(?request, "Applying queued transition");
            let result = match request {
                Transition::Change { key, payload } => self.replace(key, payload).await,
                Transition::Push { key, payload } => self.push(key, payload).await,
                Transition::Pop => self.pop().await,
            };
            applied += 1;
            if matches!(result, Err(StateError::Cancelled)) {
                break;
            }
        }
        applied
    }

    /// One scheduling tick: forwards to the current state once it has fully
    /// entered. Suspended states never receive ticks.
    pub async fn update(&mut self) {
        self.process_transitions().await;

        let Some(active) = self.current else {
            return;
        };
        if !active.ready {
            trace!(state = active.key.name(), "Update withheld until enter completes");
            return;
        }

        let cx = self.context(active.key);
        if let Some(entry) = self.states.get_mut(&active.key.id()) {
            entry.state.update(&cx);
        }

        self.process_transitions().await;
    }

    async fn replace(&mut self, key: StateKey, payload: Option<StatePayload>) -> StateResult<()> {
        self.ensure_registered(key)?;
        self.deactivate(false).await?;
        self.activate(key, payload, false).await
    }

    async fn push(&mut self, key: StateKey, payload: Option<StatePayload>) -> StateResult<()> {
        self.ensure_registered(key)?;
        if let Some(previous) = self.deactivate(true).await? {
            self.stack.push(previous);
        }
        self.activate(key, payload, false).await
    }

    async fn pop(&mut self) -> StateResult<()> {
        if self.stack.is_empty() {
            let err = StateError::EmptyStack;
            error!("{err}");
            return Err(err);
        }
        self.deactivate(false).await?;
        let Some(previous) = self.stack.pop() else {
            return Err(StateError::EmptyStack);
        };
        self.activate(previous, None, true).await
    }

    fn ensure_registered(&self, key: StateKey) -> StateResult<()> {
        if self.states.contains_key(&key.id()) {
            return Ok(());
        }
        let err = StateError::Unregistered(key.name());
        error!(state = key.name(), "{err}");
        Err(err)
    }

    /// Run `exit` on the current state. Returns the state that was exited.
    async fn deactivate(&mut self, suspending: bool) -> StateResult<Option<StateKey>> {
        let Some(active) = self.current else {
            return Ok(None);
        };
        self.current = Some(Active {
            ready: false,
            ..active
        });

        let cx = self.context(active.key);
        let cancel = self.cancel.clone();
        let Some(entry) = self.states.get_mut(&active.key.id()) else {
            self.current = None;
            return Ok(None);
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = entry.state.exit(&cx) => Some(result),
        };

        match outcome {
            None => {
                info!(state = active.key.name(), "Exit interrupted by shutdown");
                return Err(StateError::Cancelled);
            }
            Some(Err(err)) => {
                let message = format!("{err:#}");
                error!(state = active.key.name(), error = %message, "State failed to exit cleanly");
            }
            Some(Ok(())) => {}
        }

        self.current = None;
        debug!(state = active.key.name(), suspending, "Exited state");
        announce_exited(self.announcer.clone(), active.key, suspending).await;
        Ok(Some(active.key))
    }

    /// Make `key` current and run its `enter`; marks it ready on success.
    async fn activate(
        &mut self,
        key: StateKey,
        payload: Option<StatePayload>,
        resumed: bool,
    ) -> StateResult<()> {
        self.current = Some(Active { key, ready: false });

        let cx = self.context(key);
        let cancel = self.cancel.clone();
        let Some(entry) = self.states.get_mut(&key.id()) else {
            return Err(StateError::Unregistered(key.name()));
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = entry.state.enter(&cx, payload) => Some(result),
        };

        match outcome {
            None => {
                info!(state = key.name(), "Enter interrupted by shutdown");
                Err(StateError::Cancelled)
            }
            Some(Err(source)) => {
                let message = format!("{source:#}");
                error!(state = key.name(), error = %message, "State failed to enter");
                Err(StateError::Enter {
                    state: key.name(),
                    source,
                })
            }
            Some(Ok(())) => {
                if let Some(active) = self.current.as_mut() {
                    active.ready = true;
                }
                info!(state = key.name(), resumed, "Entered state");
                announce_entered(self.announcer.clone(), key, resumed).await;
                Ok(())
            }
        }
    }

    fn context(&self, key: StateKey) -> StateContext {
        StateContext::new(key, self.transitions.clone(), self.cancel.clone())
    }
}

impl Default for GameStateService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GameStateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.states.values().map(|r| r.key.name()).collect();
        registered.sort_unstable();
        f.debug_struct("GameStateService")
            .field("registered", &registered)
            .field("current", &self.current_state_name())
            .field("ready", &self.is_ready())
            .field("stack", &self.suspended())
            .finish()
    }
}

async fn announce_entered(
    dispatcher: Option<Arc<Dispatcher<StateMachineEvent>>>,
    key: StateKey,
    resumed: bool,
) {
    let Some(dispatcher) = dispatcher else {
        return;
    };
    let result = dispatcher
        .emit::<StateEntered, _>(|event| {
            event.state = key.name();
            event.resumed = resumed;
        })
        .await;
    if let Err(err) = result {
        warn!(state = key.name(), error = %err, "Failed to announce state entry");
    }
}

async fn announce_exited(
    dispatcher: Option<Arc<Dispatcher<StateMachineEvent>>>,
    key: StateKey,
    suspended: bool,
) {
    let Some(dispatcher) = dispatcher else {
        return;
    };
    let result = dispatcher
        .emit::<StateExited, _>(|event| {
            event.state = key.name();
            event.suspended = suspended;
        })
        .await;
    if let Err(err) = result {
        warn!(state = key.name(), error = %err, "Failed to announce state exit");
    }
}
