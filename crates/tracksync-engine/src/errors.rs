//! Sync engine error model and runner backoff policy.

use std::time::Duration;

use tracksync_types::AssetId;

// ---------------------------------------------------------------------------
// SyncError: engine bookkeeping violations
// ---------------------------------------------------------------------------

/// Invariant violation inside a sync cycle.
///
/// Adapter and tracking-service failures never surface here; they end the
/// cycle as [`CycleOutcome::Aborted`](crate::result::CycleOutcome) or as
/// per-asset `FailedRequest` states.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The merged fetch set holds the same asset twice.
    #[error("asset {asset_id} appears more than once in the merged batch")]
    DuplicateAsset { asset_id: AssetId },

    /// Fewer or more asset states came out of the fetch phase than went in.
    #[error("asset state count mismatch: {expected} fetched, {actual} updated")]
    StateCountMismatch { expected: usize, actual: usize },
}

/// Convenience alias used by the syncer.
pub type Result<T> = std::result::Result<T, SyncError>;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Delay before the next cycle after `consecutive_failures` failed cycles in
/// a row.
///
/// Zero or one failure waits the plain `interval`; every further failure
/// doubles it, never beyond `max_backoff`.
#[must_use]
pub fn compute_backoff(interval: Duration, max_backoff: Duration, consecutive_failures: u32) -> Duration {
    let factor = 2u32
        .checked_pow(consecutive_failures.saturating_sub(1))
        .unwrap_or(u32::MAX);
    interval
        .saturating_mul(factor)
        .min(max_backoff.max(interval))
}
