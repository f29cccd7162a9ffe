//! Wiring: dispatchers, states, and the run loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use keystone_common::{AppConfig, AssetProvider};
use keystone_events::{Dispatcher, Listener};
use keystone_save::SavingSystem;
use keystone_states::{
    run_update_loop, CancellationToken, GameStateService, StateError, StateMachineEvent, StateSet,
};
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::app_data::AppData;
use crate::events::ScoreChanged;
use crate::states::{LoadingState, MenuState, Pacing, PauseState, PlayState, Services};

/// Every asset key the states instantiate.
pub const APP_ASSETS: [&str; 3] = ["ui/loading_screen", "ui/main_menu", "ui/game_hud"];

/// Outcome of [`App::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_state: Option<&'static str>,
    pub data: AppData,
}

pub struct App {
    services: Services,
    state_events: Arc<Dispatcher<StateMachineEvent>>,
    machine: GameStateService,
    score_keeper: Listener,
}

impl App {
    pub fn new(
        config: &AppConfig,
        assets: Arc<dyn AssetProvider>,
        pacing: Pacing,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let services = Services {
            saving: SavingSystem::in_dir(&config.save_dir),
            assets,
            game_events: Arc::new(Dispatcher::with_prewarm("game", &config.prewarm)?),
            app_data: Arc::new(Mutex::new(AppData::default())),
            tasks: TaskTracker::new(),
            pacing,
        };
        let state_events = Arc::new(Dispatcher::with_prewarm("states", &config.prewarm)?);

        let score_keeper = Listener::new("score-keeper");
        let progress = services.app_data.clone();
        services
            .game_events
            .subscribe(&score_keeper, move |event: &ScoreChanged| {
                let mut data = progress.lock().unwrap_or_else(PoisonError::into_inner);
                data.scores += event.delta;
                data.best_score = data.best_score.max(event.score);
                Ok(())
            })?;

        let mut machine = GameStateService::new()
            .with_cancellation(cancel)
            .with_dispatcher(state_events.clone());
        machine.register_states(
            StateSet::new()
                .with(LoadingState::new(services.clone()))
                .with(MenuState::new(services.clone()))
                .with(PlayState::new(services.clone()))
                .with(PauseState::new(services.clone())),
        );

        Ok(Self {
            services,
            state_events,
            machine,
            score_keeper,
        })
    }

    /// Transition announcements, for observers.
    pub fn state_events(&self) -> &Arc<Dispatcher<StateMachineEvent>> {
        &self.state_events
    }

    pub fn machine(&self) -> &GameStateService {
        &self.machine
    }

    /// Enter loading, tick until cancelled or `max_ticks`, then save progress.
    pub async fn run(mut self, tick_interval: Duration, max_ticks: Option<u64>) -> Result<RunSummary> {
        match self.machine.change_state::<LoadingState>(None).await {
            Ok(()) => {}
            Err(StateError::Cancelled) => info!("Shutdown requested during loading"),
            Err(err) => return Err(err).context("Failed to start"),
        }

        let ticks = run_update_loop(&mut self.machine, tick_interval, max_ticks).await;

        self.services.tasks.close();
        self.services.tasks.wait().await;
        self.score_keeper.close();

        let data = self.services.app_data().clone();
        self.services
            .saving
            .save(&data)
            .await
            .context("Failed to save progress")?;

        Ok(RunSummary {
            ticks,
            final_state: self.machine.current_state_name(),
            data,
        })
    }
}
