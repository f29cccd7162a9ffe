use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::ConfigError;
use crate::file_config::{load_config, FileConfig, PrewarmConfig};

const DEFAULT_TICK_MS: u64 = 16;
const DEFAULT_SAVE_DIR: &str = "./saves";

/// Application configuration assembled from environment variables and an
/// optional TOML file. Environment values win over file values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub tick_interval: Duration,
    pub save_dir: PathBuf,
    pub max_ticks: Option<u64>,
    pub prewarm: PrewarmConfig,
}

impl AppConfig {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config_path = lookup("KEYSTONE_CONFIG").map(PathBuf::from);
        let file = match &config_path {
            Some(path) => load_config(path)?,
            None => FileConfig::default(),
        };

        let tick_ms = match parse_env::<u64>(&lookup, "KEYSTONE_TICK_MS")? {
            Some(ms) => ms,
            None => file.states.tick_interval_ms.unwrap_or(DEFAULT_TICK_MS),
        };

        let config = Self {
            config_path,
            tick_interval: Duration::from_millis(tick_ms.max(1)),
            save_dir: lookup("KEYSTONE_SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR)),
            max_ticks: parse_env(&lookup, "KEYSTONE_MAX_TICKS")?,
            prewarm: file.events.prewarm,
        };

        Ok(config)
    }

    pub fn log_summary(&self) {
        info!("Config loaded:");
        info!(
            "  KEYSTONE_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<not set>".to_string())
        );
        info!("  tick interval: {:?}", self.tick_interval);
        info!("  save dir: {}", self.save_dir.display());
        match self.max_ticks {
            Some(n) => info!("  max ticks: {n}"),
            None => info!("  max ticks: <unbounded>"),
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
    }
}
