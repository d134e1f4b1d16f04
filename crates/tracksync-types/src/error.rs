//! Structured error model for adapter operations.
//!
//! [`AdapterError`] carries a classification and a stable code. Construct via
//! category-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of an adapter error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid adapter configuration.
    Config,
    /// Source unreachable or unreadable.
    TransientNetwork,
    /// Invalid or corrupt data returned by the external system.
    Data,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::TransientNetwork => "transient_network",
            Self::Data => "data",
        };
        f.write_str(s)
    }
}

/// Structured error from an adapter call.
///
/// The engine never propagates these; they turn into per-asset
/// `FailedRequest` states or a skipped page plus a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct AdapterError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
}

impl AdapterError {
    fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, code, message)
    }

    #[must_use]
    pub fn transient_network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientNetwork, code, message)
    }

    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Data, code, message)
    }
}
