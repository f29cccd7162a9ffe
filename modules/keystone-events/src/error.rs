//! Typed errors for pooling and dispatch.

use thiserror::Error;

/// Errors from pool bookkeeping. Both are reported and recoverable.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `get`/`free` for a type the pool was never built with
    #[error("the '{pool}' pool does not contain an event of type {event}")]
    Unregistered { pool: String, event: &'static str },

    /// `free` for an instance that is not currently handed out
    #[error("the '{pool}' pool has no {event} instance #{instance} in use")]
    NotBusy {
        pool: String,
        event: &'static str,
        instance: u64,
    },
}

/// Errors from the dispatcher surface.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Dispatcher constructed without a name
    #[error("dispatcher name cannot be empty")]
    EmptyName,

    /// Subscribe/invoke for an event type outside the dispatcher's family catalog.
    /// This is a programming error, not a runtime condition.
    #[error("event {event} is not registered with dispatcher '{dispatcher}'")]
    UnregisteredEvent {
        dispatcher: String,
        event: &'static str,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Result type alias for dispatcher operations.
pub type EventBusResult<T> = std::result::Result<T, EventBusError>;
