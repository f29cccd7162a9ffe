//! Application states.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use keystone_common::{AssetHandle, AssetProvider};
use keystone_events::Dispatcher;
use keystone_save::SavingSystem;
use keystone_states::{GameState, StateContext, StatePayload};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::app_data::{AppData, AppDataMigrator};
use crate::events::{GameEvents, ScoreChanged};

/// How many ticks each scripted phase lasts.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Ticks spent in the menu before play starts.
    pub menu_ticks: u32,
    /// Play pauses itself every this many ticks.
    pub pause_every: u32,
    pub pause_ticks: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            menu_ticks: 30,
            pause_every: 120,
            pause_ticks: 30,
        }
    }
}

/// Collaborators shared by every state.
#[derive(Clone)]
pub struct Services {
    pub saving: SavingSystem,
    pub assets: Arc<dyn AssetProvider>,
    pub game_events: Arc<Dispatcher<GameEvents>>,
    pub app_data: Arc<Mutex<AppData>>,
    /// Dispatches started from synchronous `update` calls.
    pub tasks: TaskTracker,
    pub pacing: Pacing,
}

impl Services {
    pub fn app_data(&self) -> MutexGuard<'_, AppData> {
        self.app_data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads saved progress and the loading screen, then moves to the menu.
pub struct LoadingState {
    services: Services,
}

impl LoadingState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl GameState for LoadingState {
    async fn enter(&mut self, cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        info!("Loading");
        let screen = instantiate(&*self.services.assets, "ui/loading_screen").await?;

        let data = self
            .services
            .saving
            .load::<AppData>(Some(&AppDataMigrator))
            .await;
        info!(
            scores = data.scores,
            best = data.best_score,
            sessions = data.sessions,
            "Progress loaded"
        );
        *self.services.app_data() = data;

        debug!(instance = screen.instance_id, "Loading finished");
        cx.transitions().change::<MenuState>(None);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

/// Shows the main menu; play starts after `Pacing::menu_ticks`.
pub struct MenuState {
    services: Services,
    view: Option<AssetHandle>,
    ticks: u32,
}

impl MenuState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            view: None,
            ticks: 0,
        }
    }
}

#[async_trait]
impl GameState for MenuState {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        info!("Entering menu");
        self.ticks = 0;
        if self.view.is_none() {
            self.view = Some(instantiate(&*self.services.assets, "ui/main_menu").await?);
        }
        Ok(())
    }

    fn update(&mut self, cx: &StateContext) {
        self.ticks += 1;
        if self.ticks == self.services.pacing.menu_ticks.max(1) {
            let level = self.services.app_data().sessions + 1;
            cx.transitions()
                .change::<PlayState>(Some(StatePayload::new(PlayRequest { level })));
        }
    }
}

// ---------------------------------------------------------------------------
// Play
// ---------------------------------------------------------------------------

/// Payload that starts a new play session.
#[derive(Debug, Clone, Copy)]
pub struct PlayRequest {
    pub level: u32,
}

/// Scores points every tick and pauses periodically.
pub struct PlayState {
    services: Services,
    hud: Option<AssetHandle>,
    level: u32,
    score: u64,
    ticks: u32,
}

impl PlayState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            hud: None,
            level: 1,
            score: 0,
            ticks: 0,
        }
    }
}

#[async_trait]
impl GameState for PlayState {
    async fn enter(&mut self, _cx: &StateContext, payload: Option<StatePayload>) -> anyhow::Result<()> {
        if self.hud.is_none() {
            self.hud = Some(instantiate(&*self.services.assets, "ui/game_hud").await?);
        }

        match payload.and_then(|p| p.downcast::<PlayRequest>().ok()) {
            Some(request) => {
                self.level = request.level;
                self.score = 0;
                self.ticks = 0;
                self.services.app_data().sessions += 1;
                info!(level = self.level, "Play session started");
            }
            None => info!(score = self.score, "Play resumed"),
        }
        Ok(())
    }

    fn update(&mut self, cx: &StateContext) {
        self.ticks += 1;
        let delta = u64::from(self.level);
        self.score += delta;

        let events = self.services.game_events.clone();
        let score = self.score;
        self.services.tasks.spawn(async move {
            let result = events
                .emit::<ScoreChanged, _>(|event| {
                    event.score = score;
                    event.delta = delta;
                })
                .await;
            if let Err(err) = result {
                warn!(error = %err, "Failed to dispatch score change");
            }
        });

        if self.ticks % self.services.pacing.pause_every.max(1) == 0 {
            cx.transitions().push::<PauseState>(None);
        }
    }

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        debug!(score = self.score, "Leaving play");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pause
// ---------------------------------------------------------------------------

/// Overlay on top of play; returns to it after `Pacing::pause_ticks`.
pub struct PauseState {
    services: Services,
    ticks: u32,
}

impl PauseState {
    pub fn new(services: Services) -> Self {
        Self { services, ticks: 0 }
    }
}

#[async_trait]
impl GameState for PauseState {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        info!("Paused");
        self.ticks = 0;
        Ok(())
    }

    fn update(&mut self, cx: &StateContext) {
        self.ticks += 1;
        if self.ticks == self.services.pacing.pause_ticks.max(1) {
            cx.transitions().pop();
        }
    }
}

async fn instantiate(assets: &dyn AssetProvider, key: &str) -> anyhow::Result<AssetHandle> {
    let handle = assets
        .instantiate(key)
        .await
        .with_context(|| format!("Failed to instantiate {key}"))?;
    debug!(asset = key, instance = handle.instance_id, "Asset instantiated");
    Ok(handle)
}
