//! Shared plumbing for the keystone crates: configuration, logging setup,
//! type naming, and the narrow collaborator interfaces the core consumes.

pub mod assets;
pub mod config;
pub mod error;
pub mod file_config;
pub mod names;
pub mod telemetry;

pub use assets::{AssetHandle, AssetProvider, MemoryAssetProvider};
pub use config::AppConfig;
pub use error::ConfigError;
pub use file_config::{load_config, EventsConfig, FileConfig, PrewarmConfig, StatesConfig};
pub use names::short_type_name;
pub use telemetry::init_tracing;
