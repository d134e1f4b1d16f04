//! Syncer state persistence for the tracksync engine.
//!
//! Provides the [`TrackingService`] trait plus [`SqliteTrackingService`] and
//! [`PostgresTrackingService`] implementations storing cursor checkpoints,
//! per-asset lifecycle state, forwarded tracking payloads and cycle history.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod postgres;
pub mod sqlite;

pub use backend::TrackingService;
pub use error::StateError;
pub use postgres::PostgresTrackingService;
pub use sqlite::SqliteTrackingService;

/// Common imports for tracking store consumers.
pub mod prelude {
    pub use crate::backend::TrackingService;
    pub use crate::error::StateError;
    pub use crate::postgres::PostgresTrackingService;
    pub use crate::sqlite::SqliteTrackingService;
    pub use tracksync_types::{
        AssetState, AssetToState, Cursor, CursorCheckpoint, CursorLabel, CycleRecord, CycleStatus,
        SyncerKey,
    };
}
