//! The generic sync cycle.
//!
//! [`GenericSyncer::sync_once`] loads the checkpoint and the active assets,
//! pulls one page of new assets, fetches everything in `batch_size` chunks,
//! forwards the payloads and only then commits asset states and the cursor.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use tracksync_state::TrackingService;
use tracksync_types::{AssetId, AssetToState, Assets, Cursor, CursorLabel, SyncerKey};

use crate::adapter::Adapter;
use crate::batch::{self, Reclassified};
use crate::errors::{self, SyncError};
use crate::metrics::SyncerMetrics;
use crate::result::{AbortStage, CycleOutcome, CycleReport};

/// Per-syncer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncerSettings {
    pub key: SyncerKey,
    /// Page size for discovery and chunk size for fetching.
    pub batch_size: NonZeroUsize,
    /// Assets with a `retry_count` above this are no longer fetched.
    pub max_retry_count: u32,
}

/// Why a cycle stopped early.
enum Interrupt {
    Abort(AbortStage, String),
    Invariant(SyncError),
}

impl From<SyncError> for Interrupt {
    fn from(err: SyncError) -> Self {
        Self::Invariant(err)
    }
}

fn abort<E: fmt::Display>(stage: AbortStage) -> impl FnOnce(E) -> Interrupt {
    move |err| Interrupt::Abort(stage, err.to_string())
}

/// Adapter-agnostic incremental syncer for one `(integration, instance)`.
pub struct GenericSyncer {
    settings: SyncerSettings,
    adapter: Box<dyn Adapter>,
    tracking: Arc<dyn TrackingService>,
    metrics: Arc<dyn SyncerMetrics>,
}

impl GenericSyncer {
    #[must_use]
    pub fn new(
        settings: SyncerSettings,
        adapter: Box<dyn Adapter>,
        tracking: Arc<dyn TrackingService>,
        metrics: Arc<dyn SyncerMetrics>,
    ) -> Self {
        Self {
            settings,
            adapter,
            tracking,
            metrics,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SyncerSettings {
        &self.settings
    }

    #[must_use]
    pub fn key(&self) -> &SyncerKey {
        &self.settings.key
    }

    #[must_use]
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Run one sync cycle.
    ///
    /// Adapter and tracking-service failures end up in the returned
    /// [`CycleReport`]; nothing is committed for an aborted cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] only when the engine's own bookkeeping is
    /// inconsistent.
    pub fn sync_once(&mut self) -> errors::Result<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::new();
        let outcome = self.run_cycle(&mut report);
        report.duration = started.elapsed();
        self.metrics.sync_once_duration(report.duration);

        let key = &self.settings.key;
        match outcome {
            Ok((cursor, label)) => {
                tracing::info!(
                    integration_id = key.integration_id.as_str(),
                    syncer_instance_id = key.syncer_instance_id.as_str(),
                    adapter = self.adapter.name(),
                    cursor = %cursor,
                    label = label.as_str(),
                    assets = report.assets.len(),
                    payloads = report.payloads_sent,
                    duration_secs = report.duration.as_secs_f64(),
                    "Sync cycle committed"
                );
                report.outcome = CycleOutcome::Committed { cursor, label };
            }
            Err(Interrupt::Abort(stage, message)) => {
                tracing::warn!(
                    integration_id = key.integration_id.as_str(),
                    syncer_instance_id = key.syncer_instance_id.as_str(),
                    stage = stage.as_str(),
                    error = %message,
                    "Sync cycle aborted, nothing committed"
                );
                self.metrics.syncer_error(&message);
                report.outcome = CycleOutcome::Aborted { stage, message };
            }
            Err(Interrupt::Invariant(err)) => {
                tracing::error!(
                    integration_id = key.integration_id.as_str(),
                    syncer_instance_id = key.syncer_instance_id.as_str(),
                    error = %err,
                    "Sync cycle bookkeeping violated"
                );
                self.metrics.syncer_error(&err.to_string());
                return Err(err);
            }
        }

        self.record_history(&report);
        Ok(report)
    }

    fn run_cycle(&mut self, report: &mut CycleReport) -> Result<(Cursor, CursorLabel), Interrupt> {
        let key = self.settings.key.clone();
        let batch_size = self.settings.batch_size.get();

        let checkpoint = self
            .tracking
            .get_last_cursor_and_state(&key)
            .map_err(abort(AbortStage::LoadCheckpoint))?;
        let (cursor, label) = match checkpoint {
            Some(cp) => (cp.cursor, CursorLabel::Update),
            None => {
                let cursor = self
                    .adapter
                    .init_cursor()
                    .map_err(abort(AbortStage::InitCursor))?;
                tracing::info!(
                    integration_id = key.integration_id.as_str(),
                    syncer_instance_id = key.syncer_instance_id.as_str(),
                    cursor = %cursor,
                    "No checkpoint yet, starting from the adapter's initial cursor"
                );
                (cursor, CursorLabel::Init)
            }
        };

        let records = self
            .tracking
            .get_active_assets(&key)
            .map_err(abort(AbortStage::LoadActiveAssets))?;
        let active = batch::parse_active_records(&records);
        report.skipped_records = active.skipped;

        let Reclassified {
            fetchable,
            exhausted,
            failed_in_budget,
        } = batch::reclassify(active.assets, self.settings.max_retry_count);
        report.exhausted = exhausted.len();
        self.metrics.failed_assets_requests(failed_in_budget);
        self.metrics.max_retry_assets_requests(exhausted.len());
        if !exhausted.is_empty() {
            tracing::warn!(
                integration_id = key.integration_id.as_str(),
                syncer_instance_id = key.syncer_instance_id.as_str(),
                count = exhausted.len(),
                max_retry_count = self.settings.max_retry_count,
                "Skipping assets that exceeded the retry budget"
            );
        }

        let first_page = self.adapter.init_assets_for_cursor(&cursor, batch_size).next();
        let (discovered, next_cursor) = match first_page {
            Some(Ok(page)) => (page.assets.assets_to_state, page.next_cursor),
            Some(Err(err)) => {
                let message = err.to_string();
                tracing::warn!(
                    integration_id = key.integration_id.as_str(),
                    syncer_instance_id = key.syncer_instance_id.as_str(),
                    adapter = self.adapter.name(),
                    error = %message,
                    "Asset discovery failed, syncing active assets only"
                );
                self.metrics.syncer_error(&message);
                report.page_error = Some(message);
                (Vec::new(), cursor)
            }
            None => (Vec::new(), cursor),
        };

        let exclude: HashSet<AssetId> = exhausted.iter().map(|a| a.asset_id().clone()).collect();
        let merged = batch::merge(fetchable, discovered, &exclude);
        batch::ensure_unique(&merged)?;
        self.metrics.total_assets_size(merged.len());

        let mut updated = Vec::with_capacity(merged.len());
        for chunk in merged.chunks(batch_size) {
            let chunk_started = Instant::now();
            let states = self.fetch_and_forward(&key, chunk, report);
            self.metrics.batch_duration(chunk_started.elapsed());
            updated.extend(states?);
        }
        if updated.len() != merged.len() {
            return Err(SyncError::StateCountMismatch {
                expected: merged.len(),
                actual: updated.len(),
            }
            .into());
        }

        report.assets = updated;
        if !report.assets.is_empty() {
            self.tracking
                .save_assets_state(&key, &report.assets)
                .map_err(abort(AbortStage::SaveAssetsState))?;
        }
        self.tracking
            .update_last_cursor(&key, label, &next_cursor)
            .map_err(abort(AbortStage::UpdateCursor))?;

        Ok((next_cursor, label))
    }

    /// Fetch one chunk and forward its payload. Returns the chunk's new
    /// states; a failed forward aborts the cycle.
    fn fetch_and_forward(
        &mut self,
        key: &SyncerKey,
        chunk: &[AssetToState],
        report: &mut CycleReport,
    ) -> Result<Vec<AssetToState>, Interrupt> {
        let request = Assets::pending(chunk.to_vec());
        let fetch_started = Instant::now();
        let response = self.adapter.get_assets_data(&request);
        self.metrics
            .get_assets_data_response_time(fetch_started.elapsed());

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(
                    integration_id = key.integration_id.as_str(),
                    syncer_instance_id = key.syncer_instance_id.as_str(),
                    adapter = self.adapter.name(),
                    assets = chunk.len(),
                    error = %message,
                    "Fetching asset data failed, marking batch as failed"
                );
                self.metrics.assets_data_error(&message);
                report.fetch_errors += 1;
                return Ok(batch::mark_failed(chunk));
            }
        };

        let states = batch::apply_fetch_result(chunk, &response.assets_to_state);

        if let Some(data) = response.data.as_ref().filter(|_| response.has_data()) {
            let bytes = serde_json::to_string(data).map_or(0, |s| s.len());
            self.metrics.assets_data_batch_size_bytes(bytes);

            let save_started = Instant::now();
            let sent = self.tracking.save_tracking_data(key, data);
            self.metrics
                .save_tracking_data_response_time(save_started.elapsed());
            sent.map_err(abort(AbortStage::SaveTrackingData))?;

            report.payloads_sent += 1;
            report.bytes_sent += bytes as u64;
            tracing::debug!(
                integration_id = key.integration_id.as_str(),
                syncer_instance_id = key.syncer_instance_id.as_str(),
                assets = chunk.len(),
                bytes,
                "Forwarded tracking data"
            );
        }

        Ok(states)
    }

    fn record_history(&self, report: &CycleReport) {
        let key = &self.settings.key;
        if let Err(err) = self.tracking.record_cycle(key, &report.to_cycle_record()) {
            tracing::warn!(
                integration_id = key.integration_id.as_str(),
                syncer_instance_id = key.syncer_instance_id.as_str(),
                error = %err,
                "Failed to record cycle history"
            );
        }
    }
}
