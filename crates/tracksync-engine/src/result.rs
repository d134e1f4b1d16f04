//! Sync cycle result types.

use std::fmt;
use std::time::Duration;

use tracksync_types::{AssetState, AssetToState, Cursor, CursorLabel, CycleRecord, CycleStatus};

/// Step at which a cycle gave up without committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortStage {
    LoadCheckpoint,
    InitCursor,
    LoadActiveAssets,
    SaveTrackingData,
    SaveAssetsState,
    UpdateCursor,
}

impl AbortStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadCheckpoint => "load_checkpoint",
            Self::InitCursor => "init_cursor",
            Self::LoadActiveAssets => "load_active_assets",
            Self::SaveTrackingData => "save_tracking_data",
            Self::SaveAssetsState => "save_assets_state",
            Self::UpdateCursor => "update_cursor",
        }
    }
}

impl fmt::Display for AbortStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Asset states and cursor were persisted.
    Committed { cursor: Cursor, label: CursorLabel },
    /// Nothing was committed; the next cycle starts from the prior checkpoint.
    Aborted { stage: AbortStage, message: String },
}

/// Result of one [`GenericSyncer::sync_once`](crate::GenericSyncer::sync_once).
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Updated states of every fetched asset (empty if the cycle aborted
    /// before fetching).
    pub assets: Vec<AssetToState>,
    /// Active assets excluded for exceeding the retry budget.
    pub exhausted: usize,
    /// Persisted records that could not be parsed.
    pub skipped_records: usize,
    /// Chunks whose `get_assets_data` call failed.
    pub fetch_errors: usize,
    /// Discovery page error, if any. The cycle continued without new assets.
    pub page_error: Option<String>,
    pub payloads_sent: usize,
    pub bytes_sent: u64,
    pub duration: Duration,
}

impl CycleReport {
    pub(crate) fn new() -> Self {
        Self {
            outcome: CycleOutcome::Aborted {
                stage: AbortStage::LoadCheckpoint,
                message: String::new(),
            },
            assets: Vec::new(),
            exhausted: 0,
            skipped_records: 0,
            fetch_errors: 0,
            page_error: None,
            payloads_sent: 0,
            bytes_sent: 0,
            duration: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Committed { .. })
    }

    #[must_use]
    pub fn count(&self, state: AssetState) -> usize {
        self.assets.iter().filter(|a| a.state() == state).count()
    }

    /// History row for [`TrackingService::record_cycle`](tracksync_state::TrackingService::record_cycle).
    #[must_use]
    pub fn to_cycle_record(&self) -> CycleRecord {
        let (status, error_message) = match &self.outcome {
            CycleOutcome::Committed { .. } => (CycleStatus::Committed, None),
            CycleOutcome::Aborted { stage, message } => {
                (CycleStatus::Aborted, Some(format!("{stage}: {message}")))
            }
        };
        CycleRecord {
            status,
            assets_total: self.assets.len() as u64,
            assets_finished: self.count(AssetState::Finished) as u64,
            assets_active: self.count(AssetState::Active) as u64,
            assets_failed: self.count(AssetState::FailedRequest) as u64,
            bytes_sent: self.bytes_sent,
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
            error_message,
            finished_at: None,
        }
    }
}
