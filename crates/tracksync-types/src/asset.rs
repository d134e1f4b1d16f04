//! Asset lifecycle model.
//!
//! An asset is one unit tracked across polling cycles (a DAG run, a dbt
//! job, a model). Every asset carries an [`AssetState`] and, once a fetch
//! has failed, a retry counter.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque asset identifier, unique within a synced batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an identifier out of a loosely typed JSON value.
    ///
    /// Strings and numbers are accepted; anything else (including an empty
    /// string) yields `None`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for AssetId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a tracked asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// Just discovered, not fetched yet.
    Init,
    /// Fetched, still in flight on the external system.
    Active,
    /// Fetched and done. Never returned as active again.
    Finished,
    /// The last fetch attempt failed.
    FailedRequest,
}

impl AssetState {
    /// Storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Active => "active",
            Self::Finished => "finished",
            Self::FailedRequest => "failed_request",
        }
    }

    /// Parse a storage string. Unknown values yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Self::Init),
            "active" => Some(Self::Active),
            "finished" => Some(Self::Finished),
            "failed_request" => Some(Self::FailedRequest),
            _ => None,
        }
    }

    /// `true` for states that may still produce new data.
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Finished)
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable (asset, state) pair.
///
/// Transitions return a new value; `retry_count` only ever grows through
/// [`AssetToState::failed_request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetToState {
    asset_id: AssetId,
    state: AssetState,
    #[serde(default)]
    retry_count: u32,
}

impl AssetToState {
    #[must_use]
    pub fn new(asset_id: impl Into<AssetId>, state: AssetState) -> Self {
        Self {
            asset_id: asset_id.into(),
            state,
            retry_count: 0,
        }
    }

    /// A freshly discovered asset.
    #[must_use]
    pub fn init(asset_id: impl Into<AssetId>) -> Self {
        Self::new(asset_id, AssetState::Init)
    }

    #[must_use]
    pub fn with_retry_count(asset_id: impl Into<AssetId>, state: AssetState, retry_count: u32) -> Self {
        Self {
            asset_id: asset_id.into(),
            state,
            retry_count,
        }
    }

    #[must_use]
    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    #[must_use]
    pub fn state(&self) -> AssetState {
        self.state
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Same asset and retry history, different state.
    #[must_use]
    pub fn with_state(&self, state: AssetState) -> Self {
        Self {
            asset_id: self.asset_id.clone(),
            state,
            retry_count: self.retry_count,
        }
    }

    #[must_use]
    pub fn finished(&self) -> Self {
        self.with_state(AssetState::Finished)
    }

    #[must_use]
    pub fn active(&self) -> Self {
        self.with_state(AssetState::Active)
    }

    /// Record one more failed fetch.
    #[must_use]
    pub fn failed_request(&self) -> Self {
        Self {
            asset_id: self.asset_id.clone(),
            state: AssetState::FailedRequest,
            retry_count: self.retry_count.saturating_add(1),
        }
    }

    /// `true` once the asset has failed more often than `max_retry_count`.
    #[must_use]
    pub fn exceeds_retries(&self, max_retry_count: u32) -> bool {
        self.retry_count > max_retry_count
    }

    /// Persisted record shape:
    /// `{"asset_uri": id, "state": state, "data": {"retry_count": n}}`.
    #[must_use]
    pub fn to_record(&self) -> Value {
        serde_json::json!({
            "asset_uri": self.asset_id.as_str(),
            "state": self.state.as_str(),
            "data": { "retry_count": self.retry_count },
        })
    }

    /// Parse a persisted record defensively.
    #[must_use]
    pub fn from_record(record: &Value) -> RecordParse {
        let Some(id) = record.get("asset_uri").and_then(AssetId::from_json) else {
            return RecordParse::skipped("missing or invalid asset_uri");
        };

        let state = match record.get("state") {
            Some(Value::String(s)) => match AssetState::parse(s) {
                Some(state) => state,
                None => return RecordParse::skipped(format!("unknown state '{s}' for asset {id}")),
            },
            _ => return RecordParse::skipped(format!("missing state for asset {id}")),
        };

        let retry_count = match record.get("data").and_then(|d| d.get("retry_count")) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => match n.as_u64().and_then(|v| u32::try_from(v).ok()) {
                Some(v) => v,
                None => {
                    return RecordParse::skipped(format!("malformed retry_count {n} for asset {id}"))
                }
            },
            Some(other) => {
                return RecordParse::skipped(format!("malformed retry_count {other} for asset {id}"))
            }
        };

        RecordParse::Parsed(Self::with_retry_count(id, state, retry_count))
    }
}

/// Outcome of parsing one persisted asset record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordParse {
    Parsed(AssetToState),
    Skipped { reason: String },
}

impl RecordParse {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// A batch of assets plus their fetched payload.
///
/// `data == None` means the identifiers have not been fetched yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub assets_to_state: Vec<AssetToState>,
}

impl Assets {
    /// Identifiers awaiting a fetch.
    #[must_use]
    pub fn pending(assets_to_state: Vec<AssetToState>) -> Self {
        Self {
            data: None,
            assets_to_state,
        }
    }

    #[must_use]
    pub fn with_data(data: Value, assets_to_state: Vec<AssetToState>) -> Self {
        Self {
            data: Some(data),
            assets_to_state,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets_to_state.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets_to_state.is_empty()
    }

    /// `true` when there is a payload worth forwarding downstream.
    #[must_use]
    pub fn has_data(&self) -> bool {
        match &self.data {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &AssetId> {
        self.assets_to_state.iter().map(AssetToState::asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn asset_state_storage_strings() {
        for state in [
            AssetState::Init,
            AssetState::Active,
            AssetState::Finished,
            AssetState::FailedRequest,
        ] {
            assert_eq!(AssetState::parse(state.as_str()), Some(state));
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, json!(state.as_str()));
        }
        assert_eq!(AssetState::parse("wow"), None);
    }

    #[test]
    fn transitions_do_not_mutate_original() {
        let asset = AssetToState::with_retry_count("a", AssetState::FailedRequest, 2);
        let done = asset.finished();
        let failed = asset.failed_request();

        assert_eq!(asset.state(), AssetState::FailedRequest);
        assert_eq!(asset.retry_count(), 2);
        assert_eq!(done.state(), AssetState::Finished);
        assert_eq!(done.retry_count(), 2);
        assert_eq!(failed.retry_count(), 3);
        assert_eq!(failed.asset_id().as_str(), "a");
    }

    #[test]
    fn exceeds_retries_is_strict() {
        let at_max = AssetToState::with_retry_count("a", AssetState::FailedRequest, 5);
        assert!(!at_max.exceeds_retries(5));
        assert!(at_max.failed_request().exceeds_retries(5));
    }

    #[test]
    fn record_round_trip_shape() {
        let asset = AssetToState::with_retry_count("3", AssetState::FailedRequest, 1);
        assert_eq!(
            asset.to_record(),
            json!({"asset_uri": "3", "state": "failed_request", "data": {"retry_count": 1}})
        );
        assert_eq!(
            AssetToState::from_record(&asset.to_record()),
            RecordParse::Parsed(asset)
        );
    }

    #[test]
    fn numeric_asset_uri_is_accepted() {
        let record = json!({"asset_uri": 3, "state": "failed_request", "data": {"retry_count": 1}});
        let RecordParse::Parsed(asset) = AssetToState::from_record(&record) else {
            panic!("expected parsed record");
        };
        assert_eq!(asset.asset_id().as_str(), "3");
        assert_eq!(asset.retry_count(), 1);
    }

    #[test]
    fn missing_data_defaults_retry_count() {
        let record = json!({"asset_uri": "x", "state": "active"});
        let RecordParse::Parsed(asset) = AssetToState::from_record(&record) else {
            panic!("expected parsed record");
        };
        assert_eq!(asset.retry_count(), 0);
        assert_eq!(asset.state(), AssetState::Active);
    }

    #[rstest]
    #[case::unknown_state(json!({"asset_uri": 1, "state": "wow"}))]
    #[case::missing_state(json!({"asset_uri": 1}))]
    #[case::missing_id(json!({"state": "active"}))]
    #[case::empty_id(json!({"asset_uri": "", "state": "active"}))]
    #[case::object_id(json!({"asset_uri": {"a": 1}, "state": "active"}))]
    #[case::negative_retry(json!({"asset_uri": 1, "state": "active", "data": {"retry_count": -1}}))]
    #[case::string_retry(json!({"asset_uri": 1, "state": "active", "data": {"retry_count": "2"}}))]
    #[case::not_an_object(json!("asset"))]
    fn malformed_records_are_skipped(#[case] record: Value) {
        assert!(matches!(
            AssetToState::from_record(&record),
            RecordParse::Skipped { .. }
        ));
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some(Value::Null), false)]
    #[case(Some(json!({})), false)]
    #[case(Some(json!([])), false)]
    #[case(Some(json!({"data": [1]})), true)]
    #[case(Some(json!([0])), true)]
    #[case(Some(json!("payload")), true)]
    fn has_data_treats_empty_containers_as_empty(#[case] data: Option<Value>, #[case] expected: bool) {
        let assets = Assets {
            data,
            assets_to_state: vec![AssetToState::init("a")],
        };
        assert_eq!(assets.has_data(), expected);
    }
}
