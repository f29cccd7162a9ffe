//! Hierarchical game-state machine.
//!
//! States are registered once and addressed by type. The machine keeps one
//! current state plus a LIFO stack of suspended ones, and drives
//! exit-then-enter transitions that may suspend on async work. States ask for
//! further transitions through a [`Transitions`] queue; the machine applies
//! queued requests right after the step that raised them, before any further
//! `update` reaches a state.

pub mod driver;
pub mod error;
pub mod events;
pub mod payload;
pub mod service;
pub mod state;
pub mod transitions;

pub use driver::run_update_loop;
pub use error::{StateError, StateResult};
pub use events::{StateEntered, StateExited, StateMachineEvent};
pub use payload::StatePayload;
pub use service::{GameStateService, StateSet};
pub use state::{GameState, StateContext, StateKey};
pub use transitions::Transitions;
pub use tokio_util::sync::CancellationToken;
