//! Asset instantiation collaborator.
//!
//! The core never loads assets itself; states that need them await an
//! `AssetProvider`. `MemoryAssetProvider` backs tests and the demo binary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

/// A spawned asset instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHandle {
    pub key: String,
    pub instance_id: u64,
}

/// Instantiates an asset by key, asynchronously.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    async fn instantiate(&self, key: &str) -> Result<AssetHandle>;
}

/// In-memory provider with a fixed catalog and an optional artificial delay.
pub struct MemoryAssetProvider {
    catalog: HashSet<String>,
    delay: Duration,
    next_id: AtomicU64,
    spawned: Mutex<Vec<AssetHandle>>,
}

impl MemoryAssetProvider {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            catalog: keys.into_iter().map(Into::into).collect(),
            delay: Duration::ZERO,
            next_id: AtomicU64::new(1),
            spawned: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every handle handed out so far.
    pub fn spawned(&self) -> Vec<AssetHandle> {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AssetProvider for MemoryAssetProvider {
    async fn instantiate(&self, key: &str) -> Result<AssetHandle> {
        if !self.catalog.contains(key) {
            bail!("unknown asset: {key}");
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let handle = AssetHandle {
            key: key.to_string(),
            instance_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.clone());
        Ok(handle)
    }
}
