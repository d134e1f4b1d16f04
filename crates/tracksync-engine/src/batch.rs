//! Pure batch bookkeeping for a sync cycle: loading persisted records,
//! retry budgeting, merging active with newly discovered assets, and
//! mapping fetch results back onto asset states.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracksync_types::{AssetId, AssetState, AssetToState, RecordParse};

use crate::errors::{self, SyncError};

/// Assets loaded from persisted active records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    pub assets: Vec<AssetToState>,
    pub skipped: usize,
}

/// Parse persisted records, skipping malformed ones and keeping the first
/// occurrence of every asset id.
#[must_use]
pub fn parse_active_records(records: &[Value]) -> ActiveSet {
    let mut seen = HashSet::new();
    let mut set = ActiveSet::default();

    for record in records {
        match AssetToState::from_record(record) {
            RecordParse::Parsed(asset) => {
                if seen.insert(asset.asset_id().clone()) {
                    set.assets.push(asset);
                } else {
                    tracing::warn!(
                        asset_id = %asset.asset_id(),
                        "Duplicate active asset record, keeping the first"
                    );
                }
            }
            RecordParse::Skipped { reason } => {
                tracing::warn!(reason = %reason, "Skipping unparseable active asset record");
                set.skipped += 1;
            }
        }
    }

    set
}

/// Active assets split by retry budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reclassified {
    /// Assets to fetch this cycle, in their original order.
    pub fetchable: Vec<AssetToState>,
    /// Assets whose `retry_count` exceeds the budget. Never fetched again.
    pub exhausted: Vec<AssetToState>,
    /// `FailedRequest` assets still within budget.
    pub failed_in_budget: usize,
}

#[must_use]
pub fn reclassify(assets: Vec<AssetToState>, max_retry_count: u32) -> Reclassified {
    let mut out = Reclassified::default();
    for asset in assets {
        if asset.exceeds_retries(max_retry_count) {
            out.exhausted.push(asset);
            continue;
        }
        if asset.state() == AssetState::FailedRequest {
            out.failed_in_budget += 1;
        }
        out.fetchable.push(asset);
    }
    out
}

/// Active assets first, then discovered assets not already known.
///
/// On overlap the active entry wins, keeping its retry history. Ids in
/// `exclude` (exhausted assets) are never re-added by discovery.
#[must_use]
pub fn merge(
    active: Vec<AssetToState>,
    discovered: Vec<AssetToState>,
    exclude: &HashSet<AssetId>,
) -> Vec<AssetToState> {
    let mut seen: HashSet<AssetId> = active.iter().map(|a| a.asset_id().clone()).collect();
    let mut merged = active;

    for asset in discovered {
        if exclude.contains(asset.asset_id()) {
            continue;
        }
        if seen.insert(asset.asset_id().clone()) {
            merged.push(asset);
        }
    }

    merged
}

/// Fail if any asset id occurs twice.
///
/// # Errors
///
/// Returns [`SyncError::DuplicateAsset`] naming the first repeated id.
pub fn ensure_unique(assets: &[AssetToState]) -> errors::Result<()> {
    let mut seen = HashSet::with_capacity(assets.len());
    for asset in assets {
        if !seen.insert(asset.asset_id()) {
            return Err(SyncError::DuplicateAsset {
                asset_id: asset.asset_id().clone(),
            });
        }
    }
    Ok(())
}

/// Map an adapter response back onto the requested assets, in request order.
///
/// The retry history always comes from the request; the response only
/// decides the next state. Requested assets missing from the response count
/// as failed.
#[must_use]
pub fn apply_fetch_result(requested: &[AssetToState], returned: &[AssetToState]) -> Vec<AssetToState> {
    let mut by_id: HashMap<&AssetId, AssetState> = HashMap::with_capacity(returned.len());
    for asset in returned {
        by_id.entry(asset.asset_id()).or_insert(asset.state());
    }

    requested
        .iter()
        .map(|asset| match by_id.get(asset.asset_id()) {
            Some(AssetState::Active) => asset.active(),
            Some(AssetState::Finished | AssetState::Init) => asset.finished(),
            Some(AssetState::FailedRequest) => asset.failed_request(),
            None => {
                tracing::warn!(
                    asset_id = %asset.asset_id(),
                    "Adapter response omitted a requested asset, marking it failed"
                );
                asset.failed_request()
            }
        })
        .collect()
}

/// Every asset of a chunk whose fetch errored as a whole.
#[must_use]
pub fn mark_failed(requested: &[AssetToState]) -> Vec<AssetToState> {
    requested.iter().map(AssetToState::failed_request).collect()
}
