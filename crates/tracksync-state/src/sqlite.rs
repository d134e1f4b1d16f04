//! `SQLite`-backed implementation of [`TrackingService`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracksync_types::{
    AssetState, AssetToState, Cursor, CursorCheckpoint, CursorLabel, CycleRecord, CycleStatus,
    SyncerKey,
};

use crate::backend::{active_record, TrackingService};
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for tracking tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS syncer_cursors (
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    cursor_json TEXT NOT NULL,
    label TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (integration_id, syncer_instance_id)
);

CREATE TABLE IF NOT EXISTS asset_states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    state TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (integration_id, syncer_instance_id, asset_id)
);

CREATE TABLE IF NOT EXISTS tracking_payloads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sync_cycles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    integration_id TEXT NOT NULL,
    syncer_instance_id TEXT NOT NULL,
    status TEXT NOT NULL,
    assets_total INTEGER NOT NULL DEFAULT 0,
    assets_finished INTEGER NOT NULL DEFAULT 0,
    assets_active INTEGER NOT NULL DEFAULT 0,
    assets_failed INTEGER NOT NULL DEFAULT 0,
    bytes_sent INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    finished_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_asset_states_syncer ON asset_states (integration_id, syncer_instance_id, state);
CREATE INDEX IF NOT EXISTS idx_sync_cycles_syncer ON sync_cycles (integration_id, syncer_instance_id);
";

/// `SQLite`-backed tracking store.
///
/// Create with [`SqliteTrackingService::open`] for file-backed persistence
/// or [`SqliteTrackingService::in_memory`] for tests.
pub struct SqliteTrackingService {
    conn: Mutex<Connection>,
}

impl SqliteTrackingService {
    /// Open or create a `SQLite` tracking database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StateError::backend)?;
        Self::init(conn)
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StateError::backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(StateError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }

    fn row_to_cycle(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, [i64; 6], Option<String>, String)> {
        Ok((
            row.get(0)?,
            [
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ],
            row.get(7)?,
            row.get(8)?,
        ))
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

impl TrackingService for SqliteTrackingService {
    fn get_last_cursor_and_state(&self, key: &SyncerKey) -> error::Result<Option<CursorCheckpoint>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT cursor_json, label, updated_at FROM syncer_cursors \
                 WHERE integration_id = ?1 AND syncer_instance_id = ?2",
                rusqlite::params![key.integration_id.as_str(), key.syncer_instance_id.as_str()],
                |row| {
                    let cursor_json: String = row.get(0)?;
                    let label: String = row.get(1)?;
                    let updated_at: String = row.get(2)?;
                    Ok((cursor_json, label, updated_at))
                },
            )
            .optional()
            .map_err(StateError::backend)?;

        let Some((cursor_json, label, updated_at)) = row else {
            return Ok(None);
        };
        let cursor: Value = serde_json::from_str(&cursor_json)?;
        let label = CursorLabel::parse(&label)
            .ok_or_else(|| StateError::Corrupt(format!("unknown cursor label '{label}'")))?;

        Ok(Some(CursorCheckpoint {
            cursor: Cursor::new(cursor),
            label,
            updated_at: Self::sqlite_to_iso8601(&updated_at),
        }))
    }

    fn get_active_assets(&self, key: &SyncerKey) -> error::Result<Vec<Value>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT asset_id, state, retry_count FROM asset_states \
                 WHERE integration_id = ?1 AND syncer_instance_id = ?2 AND state != ?3 \
                 ORDER BY id",
            )
            .map_err(StateError::backend)?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    key.integration_id.as_str(),
                    key.syncer_instance_id.as_str(),
                    AssetState::Finished.as_str(),
                ],
                |row| {
                    let asset_id: String = row.get(0)?;
                    let state: String = row.get(1)?;
                    let retry_count: i64 = row.get(2)?;
                    Ok(active_record(&asset_id, &state, retry_count))
                },
            )
            .map_err(StateError::backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StateError::backend)
    }

    fn save_tracking_data(&self, key: &SyncerKey, data: &Value) -> error::Result<()> {
        let payload = serde_json::to_string(data)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO tracking_payloads (integration_id, syncer_instance_id, payload_json) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![
                key.integration_id.as_str(),
                key.syncer_instance_id.as_str(),
                payload
            ],
        )
        .map_err(StateError::backend)?;
        Ok(())
    }

    fn save_assets_state(&self, key: &SyncerKey, assets: &[AssetToState]) -> error::Result<()> {
        if assets.is_empty() {
            return Ok(());
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend_context("save_assets_state: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO asset_states \
                 (integration_id, syncer_instance_id, asset_id, state, retry_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(integration_id, syncer_instance_id, asset_id) \
                 DO UPDATE SET state = ?4, retry_count = ?5, updated_at = datetime('now')",
            )
            .map_err(|e| StateError::backend_context("save_assets_state: prepare", e))?;

        for asset in assets {
            stmt.execute(rusqlite::params![
                key.integration_id.as_str(),
                key.syncer_instance_id.as_str(),
                asset.asset_id().as_str(),
                asset.state().as_str(),
                i64::from(asset.retry_count()),
            ])
            .map_err(|e| StateError::backend_context("save_assets_state: execute", e))?;
        }
        drop(stmt);
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
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO syncer_cursors (integration_id, syncer_instance_id, cursor_json, label, updated_at) \
             VALUES (?1, ?2, ?3, ?4, datetime('now')) \
             ON CONFLICT(integration_id, syncer_instance_id) \
             DO UPDATE SET cursor_json = ?3, label = ?4, updated_at = datetime('now')",
            rusqlite::params![
                key.integration_id.as_str(),
                key.syncer_instance_id.as_str(),
                cursor_json,
                label.as_str(),
            ],
        )
        .map_err(StateError::backend)?;
        Ok(())
    }

    fn record_cycle(&self, key: &SyncerKey, record: &CycleRecord) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO sync_cycles \
             (integration_id, syncer_instance_id, status, assets_total, assets_finished, \
              assets_active, assets_failed, bytes_sent, duration_ms, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                key.integration_id.as_str(),
                key.syncer_instance_id.as_str(),
                record.status.as_str(),
                to_i64(record.assets_total),
                to_i64(record.assets_finished),
                to_i64(record.assets_active),
                to_i64(record.assets_failed),
                to_i64(record.bytes_sent),
                to_i64(record.duration_ms),
                record.error_message,
            ],
        )
        .map_err(StateError::backend)?;
        Ok(())
    }

    fn asset_states(&self, key: &SyncerKey, include_finished: bool) -> error::Result<Vec<AssetToState>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT asset_id, state, retry_count FROM asset_states \
                 WHERE integration_id = ?1 AND syncer_instance_id = ?2 \
                 AND (?3 OR state != 'finished') ORDER BY id",
            )
            .map_err(StateError::backend)?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    key.integration_id.as_str(),
                    key.syncer_instance_id.as_str(),
                    include_finished,
                ],
                |row| {
                    let asset_id: String = row.get(0)?;
                    let state: String = row.get(1)?;
                    let retry_count: i64 = row.get(2)?;
                    Ok((asset_id, state, retry_count))
                },
            )
            .map_err(StateError::backend)?;

        let mut out = Vec::new();
        for row in rows {
            let (asset_id, state, retry_count) = row.map_err(StateError::backend)?;
            let state = AssetState::parse(&state)
                .ok_or_else(|| StateError::Corrupt(format!("unknown state '{state}' for asset {asset_id}")))?;
            let retry_count = u32::try_from(retry_count)
                .map_err(|_| StateError::Corrupt(format!("retry_count {retry_count} for asset {asset_id}")))?;
            out.push(AssetToState::with_retry_count(asset_id, state, retry_count));
        }
        Ok(out)
    }

    fn tracking_payloads(&self, key: &SyncerKey, limit: usize) -> error::Result<Vec<Value>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT payload_json FROM tracking_payloads \
                 WHERE integration_id = ?1 AND syncer_instance_id = ?2 \
                 ORDER BY id DESC LIMIT ?3",
            )
            .map_err(StateError::backend)?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    key.integration_id.as_str(),
                    key.syncer_instance_id.as_str(),
                    i64::try_from(limit).unwrap_or(i64::MAX),
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(StateError::backend)?;

        let mut payloads = Vec::new();
        for row in rows {
            let raw = row.map_err(StateError::backend)?;
            payloads.push(serde_json::from_str(&raw)?);
        }
        payloads.reverse();
        Ok(payloads)
    }

    fn recent_cycles(&self, key: &SyncerKey, limit: usize) -> error::Result<Vec<CycleRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT status, assets_total, assets_finished, assets_active, assets_failed, \
                 bytes_sent, duration_ms, error_message, finished_at FROM sync_cycles \
                 WHERE integration_id = ?1 AND syncer_instance_id = ?2 \
                 ORDER BY id DESC LIMIT ?3",
            )
            .map_err(StateError::backend)?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    key.integration_id.as_str(),
                    key.syncer_instance_id.as_str(),
                    i64::try_from(limit).unwrap_or(i64::MAX),
                ],
                Self::row_to_cycle,
            )
            .map_err(StateError::backend)?;

        let mut cycles = Vec::new();
        for row in rows {
            let (status, counts, error_message, finished_at) = row.map_err(StateError::backend)?;
            let status = CycleStatus::parse(&status)
                .ok_or_else(|| StateError::Corrupt(format!("unknown cycle status '{status}'")))?;
            cycles.push(CycleRecord {
                status,
                assets_total: to_u64(counts[0]),
                assets_finished: to_u64(counts[1]),
                assets_active: to_u64(counts[2]),
                assets_failed: to_u64(counts[3]),
                bytes_sent: to_u64(counts[4]),
                duration_ms: to_u64(counts[5]),
                error_message,
                finished_at: Some(Self::sqlite_to_iso8601(&finished_at)),
            });
        }
        Ok(cycles)
    }
}
