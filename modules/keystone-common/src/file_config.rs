use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// TOML-backed configuration loaded from disk.
/// Every section is optional; absent sections take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub states: StatesConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Per-event prewarm overrides, keyed by the event's short type name.
    #[serde(default)]
    pub prewarm: PrewarmConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatesConfig {
    pub tick_interval_ms: Option<u64>,
}

/// Mapping from event name to the number of instances created up front.
///
/// Names not present fall back to whatever the event family registered
/// (1 unless stated otherwise). Counts below 1 are raised to 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PrewarmConfig {
    counts: HashMap<String, usize>,
}

impl PrewarmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, event_name: impl Into<String>, count: usize) -> Self {
        self.counts.insert(event_name.into(), count);
        self
    }

    pub fn count_for(&self, event_name: &str) -> Option<usize> {
        self.counts.get(event_name).map(|&count| count.max(1))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
