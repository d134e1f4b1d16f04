//! Syncer YAML configuration types.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracksync_types::SyncerKey;

use crate::syncer::SyncerSettings;

/// Top-level syncer file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncerConfig {
    pub version: String,
    pub integration_id: String,
    pub syncer_instance_id: String,
    #[serde(default)]
    pub sync: SyncSettings,
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SyncerConfig {
    #[must_use]
    pub fn key(&self) -> SyncerKey {
        SyncerKey::new(self.integration_id.as_str(), self.syncer_instance_id.as_str())
    }

    /// Engine settings for this syncer. `None` if `batch_size` is zero,
    /// which validation rejects.
    #[must_use]
    pub fn settings(&self) -> Option<SyncerSettings> {
        Some(SyncerSettings {
            key: self.key(),
            batch_size: NonZeroUsize::new(self.sync.batch_size)?,
            max_retry_count: self.sync.max_retry_count,
        })
    }
}

/// Cycle cadence and batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: u64,
}

impl SyncSettings {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            batch_size: default_batch_size(),
            max_retry_count: default_max_retry_count(),
            max_backoff_seconds: default_max_backoff_seconds(),
        }
    }
}

fn default_interval_seconds() -> u64 {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_max_retry_count() -> u32 {
    5
}

fn default_max_backoff_seconds() -> u64 {
    300
}

/// Which adapter to run and its adapter-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(rename = "use")]
    pub use_ref: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    #[default]
    Sqlite,
    Postgres,
}

/// Tracking store selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    /// SQLite file path or Postgres connection string. SQLite defaults to
    /// `~/.tracksync/state.db`.
    #[serde(default)]
    pub connection: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus exporter address, e.g. `0.0.0.0:9091`. Disabled when unset.
    #[serde(default)]
    pub listen: Option<String>,
}
