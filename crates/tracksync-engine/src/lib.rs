//! Generic incremental sync engine.
//!
//! A [`GenericSyncer`] pulls asset ids from an [`Adapter`], fetches their
//! payloads, forwards them to a [`TrackingService`](tracksync_state::TrackingService)
//! and only then commits asset states and the cursor. [`SyncerRunner`] drives
//! it on an interval.

pub mod adapter;
pub mod adapters;
pub(crate) mod batch;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod resolve;
pub mod result;
pub mod runner;
pub mod syncer;

// Re-export public API for convenience
pub use adapter::{Adapter, AssetPage, AssetPages};
pub use errors::SyncError;
pub use resolve::{build_syncer, check_tracking_service, create_tracking_service, resolve_adapter};
pub use result::{AbortStage, CycleOutcome, CycleReport};
pub use runner::{RunnerOptions, RunnerSummary, SyncerRunner};
pub use syncer::{GenericSyncer, SyncerSettings};
