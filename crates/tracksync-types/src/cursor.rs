//! Cursor types for incremental sync position tracking.
//!
//! A cursor marks how far an adapter's asset discovery has progressed so a
//! later cycle (or a restarted process) resumes where the last committed
//! cycle left off. The engine never looks inside it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Adapter-defined opaque position token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(Value);

impl Cursor {
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Integer view, for adapters whose cursor is a position.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.0.as_u64()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Value> for Cursor {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Whether a checkpoint was written by the very first committed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorLabel {
    Init,
    Update,
}

impl CursorLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Update => "update",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Self::Init),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

impl fmt::Display for CursorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a persisted cursor for one syncer.
///
/// `updated_at` is an ISO-8601 UTC string (e.g. `"2026-01-15T10:00:00Z"`).
/// Backends handle timestamp formatting internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorCheckpoint {
    pub cursor: Cursor,
    pub label: CursorLabel,
    pub updated_at: String,
}
