use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Static settings of the watch cache manager and its readers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManagerConfig {
    /// Base period between full relists of every subscription.
    /// Each subscription jitters it independently by ±10%. Zero disables
    /// periodic resync.
    #[serde(default = "default_resync_period_ms")]
    pub resync_period_ms: u64,

    /// Namespace the caches are restricted to; empty means cluster-wide
    #[serde(default)]
    pub namespace: String,

    /// When true, `CompositeClient::list` reads the direct source instead of the cache
    #[serde(default)]
    pub raw_listing: bool,

    /// Upper bound a cache client waits for a replica to sync before failing
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Reject reads issued before the initial listing completed
    #[serde(default = "default_require_synced_reads")]
    pub require_synced_reads: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            resync_period_ms: default_resync_period_ms(),
            namespace: String::new(),
            raw_listing: false,
            sync_timeout_ms: default_sync_timeout_ms(),
            require_synced_reads: default_require_synced_reads(),
        }
    }
}

impl ManagerConfig {
    pub fn resync_period(&self) -> Duration {
        Duration::from_millis(self.resync_period_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sync_timeout_ms must be greater than 0".into(),
            )));
        }

        if self.namespace.trim() != self.namespace {
            return Err(Error::Config(ConfigError::Message(format!(
                "namespace {:?} must not contain surrounding whitespace",
                self.namespace
            ))));
        }

        Ok(())
    }
}

// 10 hours
fn default_resync_period_ms() -> u64 {
    36_000_000
}
fn default_sync_timeout_ms() -> u64 {
    30_000
}
fn default_require_synced_reads() -> bool {
    true
}
