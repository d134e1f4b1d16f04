//! Syncer identity and cycle history model types.
//!
//! Pure data types used by `TrackingService` implementations. Kept in the
//! types crate so both the engine and state crates can share them without
//! circular dependencies.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque integration identifier (e.g. `"airflow-prod"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationId(String);

impl IntegrationId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for IntegrationId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Opaque syncer instance name, distinguishing syncers of one integration
/// (e.g. `"runtime"` and `"lineage"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncerInstanceId(String);

impl SyncerInstanceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SyncerInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for SyncerInstanceId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Key under which all tracking state of one syncer is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncerKey {
    pub integration_id: IntegrationId,
    pub syncer_instance_id: SyncerInstanceId,
}

impl SyncerKey {
    #[must_use]
    pub fn new(
        integration_id: impl Into<IntegrationId>,
        syncer_instance_id: impl Into<SyncerInstanceId>,
    ) -> Self {
        Self {
            integration_id: integration_id.into(),
            syncer_instance_id: syncer_instance_id.into(),
        }
    }
}

impl std::fmt::Display for SyncerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.integration_id, self.syncer_instance_id)
    }
}

// ---------------------------------------------------------------------------
// Cycle tracking
// ---------------------------------------------------------------------------

/// Terminal status of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Committed,
    Aborted,
}

impl CycleStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "committed" => Some(Self::Committed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History row describing one finished sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub status: CycleStatus,
    pub assets_total: u64,
    pub assets_finished: u64,
    pub assets_active: u64,
    pub assets_failed: u64,
    pub bytes_sent: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// ISO-8601 UTC timestamp. Filled in by the backend when read back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}
