//! Shared tracksync data model: asset lifecycle, cursors, syncer identity
//! and the adapter error model.
//!
//! Pure data plus invariants. Both the state and engine crates depend on
//! this crate, so it carries no I/O.

pub mod asset;
pub mod cursor;
pub mod error;
pub mod state;

pub use asset::{AssetId, AssetState, AssetToState, Assets, RecordParse};
pub use cursor::{Cursor, CursorCheckpoint, CursorLabel};
pub use error::{AdapterError, ErrorCategory};
pub use state::{CycleRecord, CycleStatus, IntegrationId, SyncerInstanceId, SyncerKey};
