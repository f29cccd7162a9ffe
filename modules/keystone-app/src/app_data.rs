use anyhow::{bail, Context};
use keystone_save::{DataMigrator, VersionedData};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const APP_DATA_VERSION: u32 = 2;

/// Player progress persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppData {
    pub version: u32,
    /// Sum of every score gained.
    pub scores: u64,
    pub best_score: u64,
    pub sessions: u32,
    pub user_name: Option<String>,
    pub is_authenticated: bool,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            version: APP_DATA_VERSION,
            scores: 0,
            best_score: 0,
            sessions: 0,
            user_name: None,
            is_authenticated: false,
        }
    }
}

impl VersionedData for AppData {
    fn version(&self) -> u32 {
        self.version
    }
}

/// Version 1 had no per-session tracking.
pub struct AppDataMigrator;

impl DataMigrator<AppData> for AppDataMigrator {
    fn migrate(&self, mut document: Value, old_version: u32, new_version: u32) -> anyhow::Result<AppData> {
        if old_version != 1 || new_version != APP_DATA_VERSION {
            bail!("no migration from v{old_version} to v{new_version}");
        }

        let fields = document
            .as_object_mut()
            .context("saved app data is not an object")?;
        let scores = fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("scores"))
            .and_then(|(_, value)| value.as_u64())
            .unwrap_or(0);

        fields.retain(|name, _| !name.eq_ignore_ascii_case("version"));
        fields.insert("version".into(), json!(new_version));
        fields.insert("scores".into(), json!(scores));
        fields.insert("best_score".into(), json!(scores));
        fields.insert("sessions".into(), json!(0));

        serde_json::from_value(document).context("migrated app data does not deserialize")
    }
}
