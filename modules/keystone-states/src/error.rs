use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// Transition to a type that was never registered
    #[error("state {0} is not registered")]
    Unregistered(&'static str),

    /// `pop_state` with nothing suspended
    #[error("there are no states on the stack to return to")]
    EmptyStack,

    /// The machine's cancellation token fired mid-transition
    #[error("transition cancelled")]
    Cancelled,

    /// The new state's enter step failed; it is current but receives no updates
    #[error("state {state} failed to enter")]
    Enter {
        state: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

pub type StateResult<T> = std::result::Result<T, StateError>;
