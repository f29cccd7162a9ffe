use serde::de::DeserializeOwned;
use serde::Serialize;

/// Data that carries its own schema version.
///
/// The version of `Self::default()` is the version this build writes; saved
/// documents with any other version go through a [`DataMigrator`].
pub trait VersionedData: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    fn version(&self) -> u32;
}

/// Upgrades a saved document from an older schema.
pub trait DataMigrator<T: VersionedData>: Send + Sync {
    fn migrate(&self, document: serde_json::Value, old_version: u32, new_version: u32) -> anyhow::Result<T>;
}
