//! Adapter resolution, tracking store creation, and syncer assembly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracksync_state::{PostgresTrackingService, SqliteTrackingService, TrackingService};

use crate::adapter::Adapter;
use crate::adapters::{jsonl, JsonlAdapter, AVAILABLE_ADAPTERS};
use crate::config::types::{StateBackendKind, StateConfig, SyncerConfig};
use crate::metrics::{NoopMetrics, PrometheusMetrics, SyncerMetrics};
use crate::syncer::GenericSyncer;

/// Instantiate the adapter named by `adapter.use`.
///
/// # Errors
///
/// Returns an error for unknown adapter names or invalid adapter config.
pub fn resolve_adapter(config: &SyncerConfig) -> Result<Box<dyn Adapter>> {
    let name = config.adapter.use_ref.trim();
    let adapter: Box<dyn Adapter> = match name {
        jsonl::NAME => Box::new(JsonlAdapter::from_config(&config.adapter.config)?),
        other => anyhow::bail!(
            "Unknown adapter '{other}', available: {}",
            AVAILABLE_ADAPTERS.join(", ")
        ),
    };
    tracing::debug!(adapter = name, "Resolved adapter");
    Ok(adapter)
}

fn default_sqlite_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tracksync").join("state.db")
}

/// Open the tracking store configured under `state`.
///
/// # Errors
///
/// Returns an error if the store can't be opened or its schema created.
pub fn create_tracking_service(config: &StateConfig) -> Result<Arc<dyn TrackingService>> {
    match config.backend {
        StateBackendKind::Sqlite => {
            let backend = if let Some(path) = &config.connection {
                SqliteTrackingService::open(Path::new(path)).context("Failed to open tracking DB")?
            } else {
                SqliteTrackingService::open(&default_sqlite_path())
                    .context("Failed to open default tracking DB")?
            };
            Ok(Arc::new(backend) as Arc<dyn TrackingService>)
        }
        StateBackendKind::Postgres => {
            let connstr = config
                .connection
                .as_deref()
                .unwrap_or("host=localhost dbname=tracksync");
            let backend = PostgresTrackingService::open(connstr)
                .map_err(|e| anyhow::anyhow!("failed to open Postgres tracking store: {e}"))?;
            Ok(Arc::new(backend) as Arc<dyn TrackingService>)
        }
    }
}

/// Try to open the tracking store, logging the outcome.
pub fn check_tracking_service(config: &StateConfig) -> bool {
    match create_tracking_service(config) {
        Ok(_) => {
            tracing::info!("Tracking store: OK");
            true
        }
        Err(e) => {
            tracing::error!("Tracking store: FAILED: {:#}", e);
            false
        }
    }
}

/// Metrics sink for one syncer: Prometheus-labelled when an exporter is
/// configured, otherwise a no-op.
#[must_use]
pub fn syncer_metrics(config: &SyncerConfig) -> Arc<dyn SyncerMetrics> {
    if config.metrics.listen.is_some() {
        Arc::new(PrometheusMetrics::new(&config.key()))
    } else {
        Arc::new(NoopMetrics)
    }
}

/// Assemble a ready-to-run syncer from a validated config.
///
/// # Errors
///
/// Returns an error if the adapter or tracking store can't be created.
pub fn build_syncer(config: &SyncerConfig) -> Result<GenericSyncer> {
    let settings = config
        .settings()
        .context("sync.batch_size must be at least 1")?;
    let adapter = resolve_adapter(config)?;
    let tracking = create_tracking_service(&config.state)?;
    Ok(GenericSyncer::new(
        settings,
        adapter,
        tracking,
        syncer_metrics(config),
    ))
}
