use keystone_events::{DispatchableEvent, EventCatalog, EventFamily};

/// Gameplay events.
#[derive(Debug)]
pub struct GameEvents;

impl EventFamily for GameEvents {
    fn register(catalog: &mut EventCatalog<Self>) {
        catalog.event_with_prewarm::<ScoreChanged>(4);
    }
}

/// The session score moved.
#[derive(Debug, Default)]
pub struct ScoreChanged {
    pub score: u64,
    pub delta: u64,
}

impl DispatchableEvent for ScoreChanged {
    type Family = GameEvents;
}
