//! State machine behavior: lifecycle ordering, the suspend stack, deferred
//! transitions, and announcements.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use keystone_events::{Dispatcher, Listener};
use keystone_states::{
    run_update_loop, CancellationToken, GameState, GameStateService, StateContext, StateEntered,
    StateError, StateExited, StateMachineEvent, StatePayload, StateSet,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn note(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn updates(log: &Log) -> Vec<String> {
    entries(log)
        .into_iter()
        .filter(|entry| entry.ends_with(":update"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Level(u32);

// ---------------------------------------------------------------------------
// Test states
// ---------------------------------------------------------------------------

struct Loading {
    log: Log,
}

#[async_trait]
impl GameState for Loading {
    async fn enter(&mut self, cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        note(&self.log, "Loading:enter");
        cx.transitions().change::<Menu>(None);
        Ok(())
    }

    fn update(&mut self, _cx: &StateContext) {
        note(&self.log, "Loading:update");
    }

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        note(&self.log, "Loading:exit");
        Ok(())
    }
}

struct Menu {
    log: Log,
}

#[async_trait]
impl GameState for Menu {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        note(&self.log, "Menu:enter");
        Ok(())
    }

    fn update(&mut self, _cx: &StateContext) {
        note(&self.log, "Menu:update");
    }

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        note(&self.log, "Menu:exit");
        Ok(())
    }
}

struct Game {
    log: Log,
    pause_after: Option<u32>,
    ticks: u32,
}

impl Game {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            pause_after: None,
            ticks: 0,
        }
    }
}

#[async_trait]
impl GameState for Game {
    async fn enter(&mut self, _cx: &StateContext, payload: Option<StatePayload>) -> anyhow::Result<()> {
        match payload.as_ref().and_then(|p| p.downcast_ref::<Level>()) {
            Some(Level(level)) => note(&self.log, format!("Game:enter level={level}")),
            None => note(&self.log, "Game:enter none"),
        }
        Ok(())
    }

    fn update(&mut self, cx: &StateContext) {
        self.ticks += 1;
        note(&self.log, "Game:update");
        if self.pause_after == Some(self.ticks) {
            cx.transitions().push::<Pause>(None);
        }
    }

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        note(&self.log, "Game:exit");
        Ok(())
    }
}

struct Pause {
    log: Log,
}

#[async_trait]
impl GameState for Pause {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        note(&self.log, "Pause:enter");
        Ok(())
    }

    fn update(&mut self, _cx: &StateContext) {
        note(&self.log, "Pause:update");
    }

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        note(&self.log, "Pause:exit");
        Ok(())
    }
}

/// Fails to enter; must never be ticked.
struct Broken {
    log: Log,
}

#[async_trait]
impl GameState for Broken {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        Err(anyhow!("asset bundle missing"))
    }

    fn update(&mut self, _cx: &StateContext) {
        note(&self.log, "Broken:update");
    }

    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        note(&self.log, "Broken:exit");
        Ok(())
    }
}

/// Refuses to exit cleanly.
struct Sticky;

#[async_trait]
impl GameState for Sticky {
    async fn exit(&mut self, _cx: &StateContext) -> anyhow::Result<()> {
        Err(anyhow!("still saving"))
    }
}

/// Enter never finishes on its own.
struct Stalled;

#[async_trait]
impl GameState for Stalled {
    async fn enter(&mut self, _cx: &StateContext, _payload: Option<StatePayload>) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Counts ticks in a shared counter.
struct Counter {
    ticks: Arc<Mutex<u64>>,
}

impl GameState for Counter {
    fn update(&mut self, _cx: &StateContext) {
        *self.ticks.lock().unwrap() += 1;
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn duplicate_registration_keeps_the_first() {
    let log = new_log();
    let mut machine = GameStateService::new();

    assert!(machine.register(Menu { log: log.clone() }));
    assert!(!machine.register(Menu { log: log.clone() }));
    assert!(machine.is_registered::<Menu>());
    assert!(!machine.is_registered::<Pause>());
}

#[test]
fn register_states_counts_new_entries() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Menu { log: log.clone() });

    let set = StateSet::new()
        .with(Menu { log: log.clone() })
        .with(Game::new(&log))
        .with(Pause { log: log.clone() });
    assert_eq!(set.len(), 3);

    assert_eq!(machine.register_states(set), 2);
    assert!(machine.is_registered::<Game>());
    assert!(machine.is_registered::<Pause>());
}

#[tokio::test]
async fn change_to_unregistered_state_keeps_current() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Menu { log: log.clone() });

    machine.change_state::<Menu>(None).await.unwrap();
    let err = machine.change_state::<Pause>(None).await.unwrap_err();

    assert!(matches!(err, StateError::Unregistered("Pause")));
    assert_eq!(machine.current_state_name(), Some("Menu"));
    assert!(machine.is_ready());
    assert_eq!(entries(&log), vec!["Menu:enter"]);
}

// ---------------------------------------------------------------------------
// Lifecycle ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_exits_old_before_entering_new() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Menu { log: log.clone() });
    machine.register(Game::new(&log));

    machine.change_state::<Menu>(None).await.unwrap();
    machine
        .change_state::<Game>(Some(StatePayload::new(Level(4))))
        .await
        .unwrap();

    assert!(machine.is_current::<Game>());
    assert_eq!(machine.stack_depth(), 0);
    assert_eq!(
        entries(&log),
        vec!["Menu:enter", "Menu:exit", "Game:enter level=4"]
    );
}

#[tokio::test]
async fn push_then_pop_exits_and_reenters_without_payload() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Game::new(&log));
    machine.register(Pause { log: log.clone() });

    machine
        .change_state::<Game>(Some(StatePayload::new(Level(1))))
        .await
        .unwrap();
    machine.push_state::<Pause>(None).await.unwrap();

    assert!(machine.is_current::<Pause>());
    assert_eq!(machine.stack_depth(), 1);
    assert_eq!(machine.suspended(), vec!["Game"]);

    machine.pop_state().await.unwrap();

    assert!(machine.is_current::<Game>());
    assert_eq!(machine.stack_depth(), 0);
    assert_eq!(
        entries(&log),
        vec![
            "Game:enter level=1",
            "Game:exit",
            "Pause:enter",
            "Pause:exit",
            "Game:enter none",
        ]
    );
}

#[tokio::test]
async fn pop_with_empty_stack_is_an_error() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Menu { log: log.clone() });
    machine.change_state::<Menu>(None).await.unwrap();

    let err = machine.pop_state().await.unwrap_err();

    assert!(matches!(err, StateError::EmptyStack));
    assert_eq!(err.to_string(), "there are no states on the stack to return to");
    assert!(machine.is_current::<Menu>());
    assert_eq!(entries(&log), vec!["Menu:enter"]);
}

#[tokio::test]
async fn pop_before_any_state_is_an_error() {
    let mut machine = GameStateService::new();
    assert!(matches!(machine.pop_state().await, Err(StateError::EmptyStack)));
    assert_eq!(machine.current_state_name(), None);
}

// ---------------------------------------------------------------------------
// Deferred transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enter_can_request_the_next_state() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Loading { log: log.clone() });
    machine.register(Menu { log: log.clone() });

    machine.change_state::<Loading>(None).await.unwrap();

    assert!(machine.is_current::<Menu>());
    assert_eq!(
        entries(&log),
        vec!["Loading:enter", "Loading:exit", "Menu:enter"]
    );
}

#[tokio::test]
async fn updates_reach_only_the_current_state() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Game::new(&log));
    machine.register(Pause { log: log.clone() });

    machine.change_state::<Game>(None).await.unwrap();
    machine.update().await;
    machine.update().await;
    machine.push_state::<Pause>(None).await.unwrap();
    machine.update().await;
    machine.pop_state().await.unwrap();
    machine.update().await;

    assert_eq!(
        updates(&log),
        vec!["Game:update", "Game:update", "Pause:update", "Game:update"]
    );
}

#[tokio::test]
async fn push_requested_during_update_lands_before_the_next_tick() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Game {
        pause_after: Some(2),
        ..Game::new(&log)
    });
    machine.register(Pause { log: log.clone() });

    machine.change_state::<Game>(None).await.unwrap();
    machine.update().await;
    assert!(machine.is_current::<Game>());

    machine.update().await;
    assert!(machine.is_current::<Pause>());
    assert!(machine.is_ready());
    assert_eq!(machine.stack_depth(), 1);

    machine.update().await;
    assert_eq!(
        updates(&log),
        vec!["Game:update", "Game:update", "Pause:update"]
    );
}

#[tokio::test]
async fn external_requests_apply_on_the_next_update() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Menu { log: log.clone() });
    machine.register(Game::new(&log));

    machine.change_state::<Menu>(None).await.unwrap();
    let transitions = machine.transitions();
    transitions.change::<Game>(Some(StatePayload::new(Level(9))));
    assert_eq!(transitions.pending(), 1);
    assert!(machine.is_current::<Menu>());

    machine.update().await;

    assert_eq!(transitions.pending(), 0);
    assert!(machine.is_current::<Game>());
    assert_eq!(updates(&log), vec!["Game:update"]);
}

// ---------------------------------------------------------------------------
// Failures and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_enter_keeps_state_current_but_not_ticked() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Broken { log: log.clone() });
    machine.register(Menu { log: log.clone() });

    let err = machine.change_state::<Broken>(None).await.unwrap_err();
    match err {
        StateError::Enter { state, source } => {
            assert_eq!(state, "Broken");
            assert_eq!(source.to_string(), "asset bundle missing");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(machine.current_state_name(), Some("Broken"));
    assert!(!machine.is_ready());

    machine.update().await;
    assert!(updates(&log).is_empty());

    machine.change_state::<Menu>(None).await.unwrap();
    assert!(machine.is_current::<Menu>());
    assert_eq!(entries(&log), vec!["Broken:exit", "Menu:enter"]);
}

#[tokio::test]
async fn failed_exit_does_not_block_the_transition() {
    let log = new_log();
    let mut machine = GameStateService::new();
    machine.register(Sticky);
    machine.register(Menu { log: log.clone() });

    machine.change_state::<Sticky>(None).await.unwrap();
    machine.change_state::<Menu>(None).await.unwrap();

    assert!(machine.is_current::<Menu>());
    assert!(machine.is_ready());
}

#[tokio::test]
async fn cancellation_interrupts_a_pending_enter() {
    let cancel = CancellationToken::new();
    let mut machine = GameStateService::new().with_cancellation(cancel.clone());
    machine.register(Stalled);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = machine.change_state::<Stalled>(None).await.unwrap_err();

    assert!(matches!(err, StateError::Cancelled));
    assert!(machine.cancellation().is_cancelled());
    assert!(!machine.is_ready());
}

// ---------------------------------------------------------------------------
// Announcements
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transitions_are_announced_on_the_dispatcher() {
    let log = new_log();
    let announcements = new_log();
    let dispatcher = Arc::new(Dispatcher::<StateMachineEvent>::new("states").unwrap());
    let listener = Listener::new("observer");

    let sink = announcements.clone();
    dispatcher
        .subscribe(&listener, move |event: &StateEntered| {
            note(&sink, format!("entered {} resumed={}", event.state, event.resumed));
            Ok(())
        })
        .unwrap();
    let sink = announcements.clone();
    dispatcher
        .subscribe(&listener, move |event: &StateExited| {
            note(&sink, format!("exited {} suspended={}", event.state, event.suspended));
            Ok(())
        })
        .unwrap();

    let mut machine = GameStateService::new().with_dispatcher(dispatcher.clone());
    machine.register(Menu { log: log.clone() });
    machine.register(Pause { log: log.clone() });

    machine.change_state::<Menu>(None).await.unwrap();
    machine.push_state::<Pause>(None).await.unwrap();
    machine.pop_state().await.unwrap();

    assert_eq!(
        entries(&announcements),
        vec![
            "entered Menu resumed=false",
            "exited Menu suspended=true",
            "entered Pause resumed=false",
            "exited Pause suspended=false",
            "entered Menu resumed=true",
        ]
    );
    assert_eq!(dispatcher.busy_count::<StateEntered>(), 0);
    assert_eq!(dispatcher.busy_count::<StateExited>(), 0);
}

#[tokio::test]
async fn announcement_handlers_can_request_transitions() {
    let log = new_log();
    let dispatcher = Arc::new(Dispatcher::<StateMachineEvent>::new("states").unwrap());
    let listener = Listener::new("router");

    let mut machine = GameStateService::new().with_dispatcher(dispatcher.clone());
    machine.register(Menu { log: log.clone() });
    machine.register(Game::new(&log));

    let transitions = machine.transitions();
    dispatcher
        .subscribe(&listener, move |event: &StateEntered| {
            if event.state == "Menu" {
                transitions.change::<Game>(None);
            }
            Ok(())
        })
        .unwrap();

    machine.change_state::<Menu>(None).await.unwrap();

    assert!(machine.is_current::<Game>());
    assert_eq!(
        entries(&log),
        vec!["Menu:enter", "Menu:exit", "Game:enter none"]
    );
}

// ---------------------------------------------------------------------------
// Update loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_loop_stops_at_the_tick_limit() {
    let ticks = Arc::new(Mutex::new(0));
    let mut machine = GameStateService::new();
    machine.register(Counter {
        ticks: ticks.clone(),
    });
    machine.change_state::<Counter>(None).await.unwrap();

    let ran = run_update_loop(&mut machine, Duration::from_millis(1), Some(5)).await;

    assert_eq!(ran, 5);
    assert_eq!(*ticks.lock().unwrap(), 5);
}

#[tokio::test]
async fn update_loop_stops_on_cancellation() {
    let ticks = Arc::new(Mutex::new(0));
    let mut machine = GameStateService::new();
    machine.register(Counter {
        ticks: ticks.clone(),
    });
    machine.change_state::<Counter>(None).await.unwrap();

    let cancel = machine.cancellation();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let ran = run_update_loop(&mut machine, Duration::from_millis(1), None).await;

    assert!(ran > 0);
    assert_eq!(*ticks.lock().unwrap(), ran);
}
