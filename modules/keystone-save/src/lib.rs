//! Versioned save data.
//!
//! Each data type is stored as one JSON document keyed by its type name.
//! Loading never fails: missing, corrupted, or unmigratable data falls back
//! to the type's default.

pub mod error;
pub mod migrator;
pub mod store;
pub mod system;

pub use error::{SaveError, SaveResult};
pub use migrator::{DataMigrator, VersionedData};
pub use store::{FileSaveStore, MemorySaveStore, SaveStore};
pub use system::SavingSystem;
