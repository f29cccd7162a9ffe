//! Transition announcements published on a [`Dispatcher<StateMachineEvent>`].
//!
//! [`Dispatcher<StateMachineEvent>`]: keystone_events::Dispatcher

use keystone_events::{DispatchableEvent, EventCatalog, EventFamily};

/// Event family for state-machine announcements.
#[derive(Debug)]
pub struct StateMachineEvent;

impl EventFamily for StateMachineEvent {
    fn register(catalog: &mut EventCatalog<Self>) {
        catalog
            .event_with_prewarm::<StateEntered>(2)
            .event_with_prewarm::<StateExited>(2);
    }
}

/// A state finished entering and is now receiving updates.
#[derive(Debug, Default)]
pub struct StateEntered {
    pub state: &'static str,
    /// Re-entered after being popped off the suspend stack.
    pub resumed: bool,
}

impl DispatchableEvent for StateEntered {
    type Family = StateMachineEvent;
}

/// A state finished exiting.
#[derive(Debug, Default)]
pub struct StateExited {
    pub state: &'static str,
    /// Moved onto the suspend stack rather than replaced.
    pub suspended: bool,
}

impl DispatchableEvent for StateExited {
    type Family = StateMachineEvent;
}
