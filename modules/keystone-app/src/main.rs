use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use keystone_app::{App, Pacing, APP_ASSETS};
use keystone_common::{init_tracing, AppConfig, MemoryAssetProvider};
use keystone_states::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Keystone starting...");

    let config = AppConfig::from_env()?;
    config.log_summary();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
    });

    let assets = Arc::new(MemoryAssetProvider::new(APP_ASSETS).with_delay(Duration::from_millis(50)));
    let app = App::new(&config, assets, Pacing::default(), cancel)?;
    let summary = app.run(config.tick_interval, config.max_ticks).await?;

    info!(
        ticks = summary.ticks,
        state = summary.final_state.unwrap_or("<none>"),
        scores = summary.data.scores,
        best = summary.data.best_score,
        sessions = summary.data.sessions,
        "Keystone stopped"
    );
    Ok(())
}
