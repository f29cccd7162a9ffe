//! Fixed-rate tick loop for a [`GameStateService`].

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::service::GameStateService;

/// Call [`GameStateService::update`] every `period` until the machine's
/// cancellation token fires or `max_ticks` updates have run. Returns the
/// number of updates performed.
pub async fn run_update_loop(
    machine: &mut GameStateService,
    period: Duration,
    max_ticks: Option<u64>,
) -> u64 {
    let cancel = machine.cancellation();
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks = 0u64;
    loop {
        if max_ticks.is_some_and(|limit| ticks >= limit) {
            debug!(ticks, "Tick limit reached");
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(ticks, "Update loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                machine.update().await;
                ticks += 1;
            }
        }
    }
    ticks
}
