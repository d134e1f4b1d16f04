//! `PostgreSQL`-backed implementation of [`TrackingService`].
//!
//! Uses the sync `postgres` crate with a single `Mutex<Client>` for
//! thread safety. The `postgres` crate manages its own internal tokio
//! runtime, so this works from any thread, including the blocking pool the
//! runner executes cycles on.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use postgres::{Client, NoTls};
use serde_json::Value;
use tracksync_types::{
    AssetState, AssetToState, Cursor, CursorCheckpoint, CursorLabel, CycleRecord, CycleStatus,
    SyncerKey,
};

use crate::backend::{active_record, TrackingService};
use crate::error::{self, StateError};

/// Idempotent DDL for tracking tables (`PostgreSQL` dialect).
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS syncer_cursors (
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    cursor_json TEXT NOT NULL,
    label TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (integration_id, syncer_instance_id)
);

CREATE TABLE IF NOT EXISTS asset_states (
    id BIGSERIAL PRIMARY KEY,
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    state TEXT NOT NULL,
    retry_count BIGINT NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    UNIQUE (integration_id, syncer_instance_id, asset_id)
);

CREATE TABLE IF NOT EXISTS tracking_payloads (
    id BIGSERIAL PRIMARY KEY,
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_cycles (
    id BIGSERIAL PRIMARY KEY,
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    status TEXT NOT NULL,
    assets_total BIGINT NOT NULL DEFAULT 0,
    assets_finished BIGINT NOT NULL DEFAULT 0,
    assets_active BIGINT NOT NULL DEFAULT 0,
    assets_failed BIGINT NOT NULL DEFAULT 0,
    bytes_sent BIGINT NOT NULL DEFAULT 0,
    duration_ms BIGINT NOT NULL DEFAULT 0,
    error_message TEXT,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_asset_states_syncer ON asset_states (integration_id, syncer_instance_id, state);
CREATE INDEX IF NOT EXISTS idx_sync_cycles_syncer ON sync_cycles (integration_id, syncer_instance_id);
";

/// `PostgreSQL`-backed tracking store.
///
/// Create with [`PostgresTrackingService::open`] providing a libpq-style
/// connection string (e.g. `"host=localhost dbname=tracksync user=postgres"`).
pub struct PostgresTrackingService {
    client: Mutex<Client>,
}

impl PostgresTrackingService {
    /// Connect to a `PostgreSQL` database and initialize tracking tables.
    ///
    /// `connstr` is a libpq-style connection string or `PostgreSQL` URI:
    /// - `"host=localhost port=5432 dbname=tracksync user=postgres"`
    /// - `"postgresql://postgres@localhost/tracksync"`
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if connection or DDL execution fails.
    pub fn open(connstr: &str) -> error::Result<Self> {
        let mut client = Client::connect(connstr, NoTls).map_err(StateError::backend)?;
        client
            .batch_execute(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }

    /// Acquire the client lock.
    fn lock_client(&self) -> error::Result<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Current UTC time as ISO-8601 string.
    fn now_iso() -> String {
        Utc::now().to_rfc3339()
    }
}

#[allow(clippy::cast_sign_loss)]
fn to_u64(v: i64) -> u64 {
    v.max(0) as u64
}

#[allow(clippy::cast_possible_wrap)]
fn to_i64(v: u64) -> i64 {
    v as i64
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl TrackingService for PostgresTrackingService {
    fn get_last_cursor_and_state(&self, key: &SyncerKey) -> error::Result<Option<CursorCheckpoint>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                "SELECT cursor_json, label, updated_at FROM syncer_cursors \
                 WHERE integration_id = $1 AND syncer_instance_id = $2",
                &[&key.integration_id.as_str(), &key.syncer_instance_id.as_str()],
            )
            .map_err(StateError::backend)?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let cursor_json: String = row.get(0);
        let label: String = row.get(1);
        let updated_at: String = row.get(2);

        let cursor: Value = serde_json::from_str(&cursor_json)?;
        let label = CursorLabel::parse(&label)
            .ok_or_else(|| StateError::Corrupt(format!("unknown cursor label '{label}'")))?;
        Ok(Some(CursorCheckpoint {
            cursor: Cursor::new(cursor),
            label,
            updated_at,
        }))
    }

    fn get_active_assets(&self, key: &SyncerKey) -> error::Result<Vec<Value>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                "SELECT asset_id, state, retry_count FROM asset_states \
                 WHERE integration_id = $1 AND syncer_instance_id = $2 AND state <> $3 \
                 ORDER BY id",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &AssetState::Finished.as_str(),
                ],
            )
            .map_err(StateError::backend)?;

        Ok(rows
            .iter()
            .map(|row| {
                let asset_id: String = row.get(0);
                let state: String = row.get(1);
                let retry_count: i64 = row.get(2);
                active_record(&asset_id, &state, retry_count)
            })
            .collect())
    }

    fn save_tracking_data(&self, key: &SyncerKey, data: &Value) -> error::Result<()> {
        let payload = serde_json::to_string(data)?;
        let mut client = self.lock_client()?;
        client
            .execute(
                "INSERT INTO tracking_payloads (integration_id, syncer_instance_id, payload_json, created_at) \
                 VALUES ($1, $2, $3, $4)",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &payload,
                    &Self::now_iso(),
                ],
            )
            .map_err(StateError::backend)?;
        Ok(())
    }

    fn save_assets_state(&self, key: &SyncerKey, assets: &[AssetToState]) -> error::Result<()> {
        if assets.is_empty() {
            return Ok(());
        }

        let now = Self::now_iso();
        let mut client = self.lock_client()?;
        let mut tx = client
            .transaction()
            .map_err(|e| StateError::backend_context("save_assets_state: begin tx", e))?;
        let stmt = tx
            .prepare(
                "INSERT INTO asset_states \
                 (integration_id, syncer_instance_id, asset_id, state, retry_count, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (integration_id, syncer_instance_id, asset_id) \
                 DO UPDATE SET state = $4, retry_count = $5, updated_at = $6",
            )
            .map_err(|e| StateError::backend_context("save_assets_state: prepare", e))?;

        for asset in assets {
            tx.execute(
                &stmt,
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &asset.asset_id().as_str(),
                    &asset.state().as_str(),
                    &i64::from(asset.retry_count()),
                    &now,
                ],
            )
            .map_err(|e| StateError::backend_context("save_assets_state: execute", e))?;
        }
        tx.commit()
            .map_err(|e| StateError::backend_context("save_assets_state: commit", e))?;
        Ok(())
    }

    fn update_last_cursor(
        &self,
        key: &SyncerKey,
        label: CursorLabel,
        cursor: &Cursor,
    ) -> error::Result<()> {
        let cursor_json = serde_json::to_string(cursor)?;
        let mut client = self.lock_client()?;
        client
            .execute(
                "INSERT INTO syncer_cursors (integration_id, syncer_instance_id, cursor_json, label, updated_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (integration_id, syncer_instance_id) \
                 DO UPDATE SET cursor_json = $3, label = $4, updated_at = $5",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &cursor_json,
                    &label.as_str(),
                    &Self::now_iso(),
                ],
            )
            .map_err(StateError::backend)?;
        Ok(())
    }

    fn record_cycle(&self, key: &SyncerKey, record: &CycleRecord) -> error::Result<()> {
        let mut client = self.lock_client()?;
        client
            .execute(
                "INSERT INTO sync_cycles \
                 (integration_id, syncer_instance_id, status, assets_total, assets_finished, \
                  assets_active, assets_failed, bytes_sent, duration_ms, error_message, finished_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &record.status.as_str(),
                    &to_i64(record.assets_total),
                    &to_i64(record.assets_finished),
                    &to_i64(record.assets_active),
                    &to_i64(record.assets_failed),
                    &to_i64(record.bytes_sent),
                    &to_i64(record.duration_ms),
                    &record.error_message,
                    &Self::now_iso(),
                ],
            )
            .map_err(StateError::backend)?;
        Ok(())
    }

    fn asset_states(&self, key: &SyncerKey, include_finished: bool) -> error::Result<Vec<AssetToState>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                "SELECT asset_id, state, retry_count FROM asset_states \
                 WHERE integration_id = $1 AND syncer_instance_id = $2 \
                 AND ($3 OR state <> 'finished') ORDER BY id",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &include_finished,
                ],
            )
            .map_err(StateError::backend)?;

        rows.iter()
            .map(|row| {
                let asset_id: String = row.get(0);
                let state: String = row.get(1);
                let retry_count: i64 = row.get(2);
                let parsed = AssetState::parse(&state).ok_or_else(|| {
                    StateError::Corrupt(format!("unknown state '{state}' for asset {asset_id}"))
                })?;
                let retry_count = u32::try_from(retry_count).map_err(|_| {
                    StateError::Corrupt(format!("retry_count {retry_count} for asset {asset_id}"))
                })?;
                Ok(AssetToState::with_retry_count(asset_id, parsed, retry_count))
            })
            .collect()
    }

    fn tracking_payloads(&self, key: &SyncerKey, limit: usize) -> error::Result<Vec<Value>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                "SELECT payload_json FROM tracking_payloads \
                 WHERE integration_id = $1 AND syncer_instance_id = $2 \
                 ORDER BY id DESC LIMIT $3",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &limit_param(limit),
                ],
            )
            .map_err(StateError::backend)?;

        let mut payloads = rows
            .iter()
            .map(|row| serde_json::from_str(row.get::<_, &str>(0)).map_err(StateError::from))
            .collect::<error::Result<Vec<Value>>>()?;
        payloads.reverse();
        Ok(payloads)
    }

    fn recent_cycles(&self, key: &SyncerKey, limit: usize) -> error::Result<Vec<CycleRecord>> {
        let mut client = self.lock_client()?;
        let rows = client
            .query(
                "SELECT status, assets_total, assets_finished, assets_active, assets_failed, \
                 bytes_sent, duration_ms, error_message, finished_at FROM sync_cycles \
                 WHERE integration_id = $1 AND syncer_instance_id = $2 \
                 ORDER BY id DESC LIMIT $3",
                &[
                    &key.integration_id.as_str(),
                    &key.syncer_instance_id.as_str(),
                    &limit_param(limit),
                ],
            )
            .map_err(StateError::backend)?;

        rows.iter()
            .map(|row| {
                let status: String = row.get(0);
                let status = CycleStatus::parse(&status)
                    .ok_or_else(|| StateError::Corrupt(format!("unknown cycle status '{status}'")))?;
                Ok(CycleRecord {
                    status,
                    assets_total: to_u64(row.get(1)),
                    assets_finished: to_u64(row.get(2)),
                    assets_active: to_u64(row.get(3)),
                    assets_failed: to_u64(row.get(4)),
                    bytes_sent: to_u64(row.get(5)),
                    duration_ms: to_u64(row.get(6)),
                    error_message: row.get(7),
                    finished_at: Some(row.get(8)),
                })
            })
            .collect()
    }
}
