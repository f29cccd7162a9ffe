//! Logging setup shared by binaries.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`, always adding `keystone=info` as a baseline directive.
/// `LOG_FORMAT=json` switches to structured JSON output.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("keystone=info".parse()?);
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    Ok(())
}
