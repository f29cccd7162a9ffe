//! The keystone demo application: a loading screen, a menu, a play loop
//! that reports scores through the event bus, and a pause overlay.

pub mod app;
pub mod app_data;
pub mod events;
pub mod states;

pub use app::{App, RunSummary, APP_ASSETS};
pub use app_data::{AppData, AppDataMigrator};
pub use events::{GameEvents, ScoreChanged};
pub use states::{LoadingState, MenuState, Pacing, PauseState, PlayRequest, PlayState, Services};
