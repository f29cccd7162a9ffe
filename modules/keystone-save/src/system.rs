use std::path::PathBuf;
use std::sync::Arc;

use keystone_common::short_type_name;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{SaveError, SaveResult};
use crate::migrator::{DataMigrator, VersionedData};
use crate::store::{FileSaveStore, SaveStore};

/// Loads and saves [`VersionedData`] through a [`SaveStore`].
#[derive(Clone)]
pub struct SavingSystem {
    store: Arc<dyn SaveStore>,
}

impl SavingSystem {
    pub fn new(store: impl SaveStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// File-backed saving under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileSaveStore::new(dir))
    }

    /// Load the saved `T`, or `T::default()` if there is nothing usable.
    ///
    /// A document whose version differs from the current one is handed to
    /// `migrator`; without one the default is returned.
    pub async fn load<T: VersionedData>(&self, migrator: Option<&dyn DataMigrator<T>>) -> T {
        let key = short_type_name::<T>();

        let raw = match self.store.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(key, "No saved data found, creating new instance");
                return T::default();
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(key, error = %message, "Failed to read saved data");
                return T::default();
            }
        };

        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(err) => {
                error!(key, error = %err, "Saved data is not valid JSON, it may be corrupted");
                return T::default();
            }
        };

        let Some(saved_version) = read_version(&document) else {
            error!(key, "Invalid or missing version field in saved data");
            return T::default();
        };

        let current_version = T::default().version();
        if saved_version != current_version {
            info!(
                key,
                saved = saved_version,
                current = current_version,
                "Saved data version mismatch, migration required"
            );
            let Some(migrator) = migrator else {
                warn!(key, "No migrator provided, using defaults");
                return T::default();
            };
            return match migrator.migrate(document, saved_version, current_version) {
                Ok(data) => data,
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(key, error = %message, "Migration failed, using defaults");
                    T::default()
                }
            };
        }

        match serde_json::from_value(document) {
            Ok(data) => data,
            Err(err) => {
                error!(key, error = %err, "Failed to deserialize saved data");
                T::default()
            }
        }
    }

    /// Write `data` as pretty-printed JSON.
    pub async fn save<T: VersionedData>(&self, data: &T) -> SaveResult<()> {
        let key = short_type_name::<T>();
        let json = serde_json::to_string_pretty(data)
            .map_err(|source| logged(SaveError::Serialize { data: key, source }))?;

        self.store.write(key, &json).await.map_err(|source| {
            logged(SaveError::Store {
                key: key.to_string(),
                source,
            })
        })?;
        info!(key, "Data saved");
        Ok(())
    }

    /// Remove the saved `T`. Returns whether anything was stored.
    pub async fn clear<T: VersionedData>(&self) -> SaveResult<bool> {
        let key = short_type_name::<T>();
        let removed = self.store.delete(key).await.map_err(|source| {
            logged(SaveError::Store {
                key: key.to_string(),
                source,
            })
        })?;
        if removed {
            info!(key, "Saved data deleted");
        } else {
            info!(key, "No saved data to delete");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SavingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavingSystem").finish_non_exhaustive()
    }
}

/// The integer `version` field, matched case-insensitively.
fn read_version(document: &Value) -> Option<u32> {
    document
        .as_object()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("version"))
        .and_then(|(_, value)| value.as_u64())
        .and_then(|version| u32::try_from(version).ok())
}

fn logged(err: SaveError) -> SaveError {
    let message = match std::error::Error::source(&err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    };
    error!(error = %message, "Save operation failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_key_is_case_insensitive() {
        assert_eq!(read_version(&json!({ "Version": 3 })), Some(3));
        assert_eq!(read_version(&json!({ "version": 1 })), Some(1));
        assert_eq!(read_version(&json!({ "VERSION": 2, "x": 0 })), Some(2));
    }

    #[test]
    fn non_integer_version_is_rejected() {
        assert_eq!(read_version(&json!({ "version": "2" })), None);
        assert_eq!(read_version(&json!({ "version": 1.5 })), None);
        assert_eq!(read_version(&json!({ "version": -1 })), None);
        assert_eq!(read_version(&json!({ "scores": 4 })), None);
        assert_eq!(read_version(&json!([1, 2])), None);
    }
}
