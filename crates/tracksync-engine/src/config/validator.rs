//! Semantic validation for parsed syncer configuration values.

use std::net::SocketAddr;

use anyhow::{bail, Result};

use crate::adapters::AVAILABLE_ADAPTERS;
use crate::config::types::{StateBackendKind, SyncerConfig};

/// Validate a parsed syncer configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the syncer config.
pub fn validate_syncer(config: &SyncerConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported syncer version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.integration_id.trim().is_empty() {
        errors.push("integration_id must not be empty".to_string());
    }
    if config.syncer_instance_id.trim().is_empty() {
        errors.push("syncer_instance_id must not be empty".to_string());
    }

    let sync = &config.sync;
    if sync.batch_size == 0 {
        errors.push("sync.batch_size must be at least 1".to_string());
    }
    if sync.interval_seconds == 0 {
        errors.push("sync.interval_seconds must be > 0".to_string());
    }
    if sync.max_backoff_seconds < sync.interval_seconds {
        errors.push(format!(
            "sync.max_backoff_seconds ({}) must be >= interval_seconds ({})",
            sync.max_backoff_seconds, sync.interval_seconds
        ));
    }

    let adapter = config.adapter.use_ref.trim();
    if adapter.is_empty() {
        errors.push("Adapter reference (use) must not be empty".to_string());
    } else if !AVAILABLE_ADAPTERS.contains(&adapter) {
        errors.push(format!(
            "Unknown adapter '{adapter}', available: {}",
            AVAILABLE_ADAPTERS.join(", ")
        ));
    }

    if config.state.backend == StateBackendKind::Postgres
        && config
            .state
            .connection
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
    {
        errors.push("state.backend 'postgres' requires state.connection".to_string());
    }

    if let Some(listen) = &config.metrics.listen {
        if listen.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "metrics.listen '{listen}' is not a socket address (host:port)"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Syncer validation failed:\n  - {}", errors.join("\n  - "));
    }
}
