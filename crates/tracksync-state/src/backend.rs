//! Tracking service trait definition.
//!
//! [`TrackingService`] defines the storage contract for syncer cursors,
//! per-asset lifecycle state, forwarded tracking payloads and cycle
//! history. Model types live in [`tracksync_types`].

use serde_json::Value;
use tracksync_types::{AssetToState, Cursor, CursorCheckpoint, CursorLabel, CycleRecord, SyncerKey};

use crate::error::{self, StateError};

/// Storage contract for syncer state.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn TrackingService>`. Every operation is keyed by [`SyncerKey`], so
/// one instance can serve many syncers.
pub trait TrackingService: Send + Sync {
    /// Read the last committed cursor and its label.
    ///
    /// Returns `Ok(None)` before the first committed cycle.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure.
    fn get_last_cursor_and_state(&self, key: &SyncerKey) -> error::Result<Option<CursorCheckpoint>>;

    /// Load every asset that is not `finished`, as raw persisted records
    /// (`{"asset_uri", "state", "data": {"retry_count"}}`), in discovery
    /// order. Records are not validated here.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure.
    fn get_active_assets(&self, key: &SyncerKey) -> error::Result<Vec<Value>>;

    /// Forward one fetched payload downstream.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the payload was not accepted.
    fn save_tracking_data(&self, key: &SyncerKey, data: &Value) -> error::Result<()>;

    /// Upsert the state of every given asset atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure; nothing is written then.
    fn save_assets_state(&self, key: &SyncerKey, assets: &[AssetToState]) -> error::Result<()>;

    /// Upsert the cursor checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure.
    fn update_last_cursor(
        &self,
        key: &SyncerKey,
        label: CursorLabel,
        cursor: &Cursor,
    ) -> error::Result<()>;

    /// Append a cycle history row.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on storage failure.
    fn record_cycle(&self, key: &SyncerKey, record: &CycleRecord) -> error::Result<()>;

    /// Current asset states, optionally including finished ones.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unsupported`] unless the backend keeps a local
    /// copy of asset state.
    fn asset_states(&self, _key: &SyncerKey, _include_finished: bool) -> error::Result<Vec<AssetToState>> {
        Err(StateError::Unsupported("asset_states"))
    }

    /// The last `limit` forwarded payloads, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unsupported`] unless the backend stores payloads.
    fn tracking_payloads(&self, _key: &SyncerKey, _limit: usize) -> error::Result<Vec<Value>> {
        Err(StateError::Unsupported("tracking_payloads"))
    }

    /// The last `limit` cycle records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unsupported`] unless the backend keeps history.
    fn recent_cycles(&self, _key: &SyncerKey, _limit: usize) -> error::Result<Vec<CycleRecord>> {
        Err(StateError::Unsupported("recent_cycles"))
    }
}

/// Build the raw record shape returned by
/// [`TrackingService::get_active_assets`] from stored columns. The state is
/// passed through verbatim so unknown values reach the engine's parser.
#[must_use]
pub fn active_record(asset_id: &str, state: &str, retry_count: i64) -> Value {
    serde_json::json!({
        "asset_uri": asset_id,
        "state": state,
        "data": { "retry_count": retry_count },
    })
}
