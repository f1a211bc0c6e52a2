use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration for the in-memory store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of shards the tenant directory is split over. Only the lookup
    /// of a tenant's state touches a shard; no transaction holds one.
    pub shards: usize,
    /// How long a transaction waits for a title another transaction holds
    /// before giving up with `LockTimeout`.
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            lock_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.shards == 0 {
            return Err(StoreError::InvalidConfig(
                "shards must be at least 1".into(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(StoreError::InvalidConfig(
                "lock_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
