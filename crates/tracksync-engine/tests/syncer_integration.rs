//! End-to-end sync cycle tests against in-memory tracking services and
//! scripted adapters.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use serde_json::{json, Value};
use tracksync_engine::adapter::{Adapter, AssetPage, AssetPages};
use tracksync_engine::metrics::{NoopMetrics, SyncerMetrics};
use tracksync_engine::result::{AbortStage, CycleOutcome};
use tracksync_engine::{GenericSyncer, SyncerSettings};
use tracksync_state::{SqliteTrackingService, StateError, TrackingService};
use tracksync_types::{
    AdapterError, AssetId, AssetState, AssetToState, Assets, Cursor, CursorCheckpoint, CursorLabel,
    CycleRecord, SyncerKey,
};

// ---------------------------------------------------------------------------
// Tracking service double
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    checkpoint: Option<(Cursor, CursorLabel)>,
    records: Vec<Value>,
    sent_data: Vec<Value>,
    assets_state: Vec<Vec<AssetToState>>,
    cycles: Vec<CycleRecord>,
    save_calls: usize,
    fail_save_on_call: Option<usize>,
    fail_active_load: bool,
    fail_assets_state: bool,
    fail_cursor_update: bool,
}

#[derive(Default)]
struct MockTrackingService {
    state: Mutex<MockState>,
}

impl MockTrackingService {
    fn with_active(records: Vec<Value>) -> Self {
        let service = Self::default();
        service.state.lock().unwrap().records = records;
        service
    }

    /// Make the `call`-th `save_tracking_data` (1-based) fail after
    /// recording the attempt.
    fn fail_save_on_call(&self, call: usize) {
        self.state.lock().unwrap().fail_save_on_call = Some(call);
    }

    fn fail_active_load(&self, fail: bool) {
        self.state.lock().unwrap().fail_active_load = fail;
    }

    fn fail_assets_state(&self, fail: bool) {
        self.state.lock().unwrap().fail_assets_state = fail;
    }

    fn fail_cursor_update(&self, fail: bool) {
        self.state.lock().unwrap().fail_cursor_update = fail;
    }

    fn checkpoint(&self) -> Option<(Cursor, CursorLabel)> {
        self.state.lock().unwrap().checkpoint.clone()
    }

    fn sent_data(&self) -> Vec<Value> {
        self.state.lock().unwrap().sent_data.clone()
    }

    fn assets_state(&self) -> Vec<Vec<AssetToState>> {
        self.state.lock().unwrap().assets_state.clone()
    }

    fn cycles(&self) -> Vec<CycleRecord> {
        self.state.lock().unwrap().cycles.clone()
    }

    fn record_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter_map(|r| r.get("asset_uri").and_then(AssetId::from_json))
            .map(|id| id.as_str().to_string())
            .collect()
    }
}

impl TrackingService for MockTrackingService {
    fn get_last_cursor_and_state(&self, _key: &SyncerKey) -> Result<Option<CursorCheckpoint>, StateError> {
        Ok(self.checkpoint().map(|(cursor, label)| CursorCheckpoint {
            cursor,
            label,
            updated_at: "2026-01-15T10:00:00Z".into(),
        }))
    }

    fn get_active_assets(&self, _key: &SyncerKey) -> Result<Vec<Value>, StateError> {
        let state = self.state.lock().unwrap();
        if state.fail_active_load {
            return Err(StateError::Unavailable("active assets endpoint down".into()));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.get("state") != Some(&json!("finished")))
            .cloned()
            .collect())
    }

    fn save_tracking_data(&self, _key: &SyncerKey, data: &Value) -> Result<(), StateError> {
        let mut state = self.state.lock().unwrap();
        state.sent_data.push(data.clone());
        state.save_calls += 1;
        if state.fail_save_on_call == Some(state.save_calls) {
            return Err(StateError::Unavailable("test".into()));
        }
        Ok(())
    }

    fn save_assets_state(&self, _key: &SyncerKey, assets: &[AssetToState]) -> Result<(), StateError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_assets_state {
            return Err(StateError::Unavailable("asset state write".into()));
        }
        state.assets_state.push(assets.to_vec());
        for asset in assets {
            let existing = state.records.iter_mut().find(|r| {
                r.get("asset_uri").and_then(AssetId::from_json).as_ref() == Some(asset.asset_id())
            });
            match existing {
                Some(record) => *record = asset.to_record(),
                None => state.records.push(asset.to_record()),
            }
        }
        Ok(())
    }

    fn update_last_cursor(
        &self,
        _key: &SyncerKey,
        label: CursorLabel,
        cursor: &Cursor,
    ) -> Result<(), StateError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_cursor_update {
            return Err(StateError::Unavailable("cursor write".into()));
        }
        state.checkpoint = Some((cursor.clone(), label));
        Ok(())
    }

    fn record_cycle(&self, _key: &SyncerKey, record: &CycleRecord) -> Result<(), StateError> {
        self.state.lock().unwrap().cycles.push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metrics double
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Metric {
    SyncOnce,
    Batch,
    GetAssetsData,
    SaveTrackingData,
    TotalAssetsSize(usize),
    BatchSizeBytes(usize),
    AssetsDataError(String),
    SyncerError(String),
    FailedRequests(usize),
    MaxRetryRequests(usize),
}

#[derive(Default)]
struct RecordingMetrics {
    events: Mutex<Vec<Metric>>,
}

impl RecordingMetrics {
    fn push(&self, metric: Metric) {
        self.events.lock().unwrap().push(metric);
    }

    fn events(&self) -> Vec<Metric> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, wanted: &Metric) -> usize {
        self.events().iter().filter(|m| *m == wanted).count()
    }
}

impl SyncerMetrics for RecordingMetrics {
    fn sync_once_duration(&self, _elapsed: Duration) {
        self.push(Metric::SyncOnce);
    }
    fn batch_duration(&self, _elapsed: Duration) {
        self.push(Metric::Batch);
    }
    fn get_assets_data_response_time(&self, _elapsed: Duration) {
        self.push(Metric::GetAssetsData);
    }
    fn save_tracking_data_response_time(&self, _elapsed: Duration) {
        self.push(Metric::SaveTrackingData);
    }
    fn total_assets_size(&self, count: usize) {
        self.push(Metric::TotalAssetsSize(count));
    }
    fn assets_data_batch_size_bytes(&self, bytes: usize) {
        self.push(Metric::BatchSizeBytes(bytes));
    }
    fn assets_data_error(&self, message: &str) {
        self.push(Metric::AssetsDataError(message.to_string()));
    }
    fn syncer_error(&self, message: &str) {
        self.push(Metric::SyncerError(message.to_string()));
    }
    fn failed_assets_requests(&self, count: usize) {
        self.push(Metric::FailedRequests(count));
    }
    fn max_retry_assets_requests(&self, count: usize) {
        self.push(Metric::MaxRetryRequests(count));
    }
}

// ---------------------------------------------------------------------------
// Adapter doubles
// ---------------------------------------------------------------------------

type Requests = Arc<Mutex<Vec<Vec<AssetToState>>>>;

/// Payload `{"data": [ids]}` with numeric ids where possible. Requested
/// `FailedRequest` assets keep failing, everything else finishes.
fn echo_payload(assets: &Assets) -> Assets {
    let ids: Vec<Value> = assets
        .ids()
        .map(|id| {
            id.as_str()
                .parse::<i64>()
                .map_or_else(|_| json!(id.as_str()), |n| json!(n))
        })
        .collect();
    Assets::with_data(
        json!({ "data": ids }),
        assets
            .assets_to_state
            .iter()
            .map(|a| {
                if a.state() == AssetState::FailedRequest {
                    a.with_state(AssetState::FailedRequest)
                } else {
                    a.finished()
                }
            })
            .collect(),
    )
}

/// Ignores the cursor it is handed: one asset per page, two pages on the
/// first iterator and one on every later iterator.
#[derive(Default)]
struct RoundRobinAdapter {
    cursor: u64,
    next_page: u64,
}

impl Adapter for RoundRobinAdapter {
    fn name(&self) -> &str {
        "round_robin"
    }

    fn init_cursor(&mut self) -> Result<Cursor, AdapterError> {
        Ok(Cursor::new(self.cursor))
    }

    fn init_assets_for_cursor(&mut self, _cursor: &Cursor, _batch_size: usize) -> AssetPages<'_> {
        let mut done = false;
        Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            let id = self.cursor + self.next_page;
            let page = AssetPage::new(
                Assets::pending(vec![AssetToState::init(id.to_string())]),
                Cursor::new(self.cursor),
            );
            self.cursor += 1;
            if self.next_page == 1 {
                done = true;
            }
            self.next_page = 1;
            Some(Ok(page))
        }))
    }

    fn get_assets_data(&mut self, assets: &Assets) -> Result<Assets, AdapterError> {
        Ok(echo_payload(assets))
    }
}

/// Honours the cursor: an index into a fixed list of asset ids.
struct ListAdapter {
    ids: Vec<String>,
    requests: Requests,
    fetch_error: Option<AdapterError>,
    page_error: Option<AdapterError>,
    init_error: Option<AdapterError>,
    /// Report every fetched asset as still `Active` instead of finished.
    keep_active: bool,
}

impl ListAdapter {
    fn new(ids: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(|s| (*s).to_string()).collect(),
            requests: Arc::default(),
            fetch_error: None,
            page_error: None,
            init_error: None,
            keep_active: false,
        }
    }
}

impl Adapter for ListAdapter {
    fn name(&self) -> &str {
        "list"
    }

    fn init_cursor(&mut self) -> Result<Cursor, AdapterError> {
        match &self.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(Cursor::new(0)),
        }
    }

    fn init_assets_for_cursor(&mut self, cursor: &Cursor, batch_size: usize) -> AssetPages<'_> {
        if let Some(err) = self.page_error.clone() {
            return Box::new(std::iter::once(Err(err)));
        }
        let start = usize::try_from(cursor.as_u64().unwrap_or(0)).unwrap();
        let ids = self.ids.clone();
        let len = ids.len();
        Box::new((start..len).step_by(batch_size).map(move |from| {
            let to = (from + batch_size).min(len);
            let assets = ids[from..to].iter().map(|id| AssetToState::init(id.as_str())).collect();
            Ok(AssetPage::new(Assets::pending(assets), Cursor::new(to)))
        }))
    }

    fn get_assets_data(&mut self, assets: &Assets) -> Result<Assets, AdapterError> {
        self.requests.lock().unwrap().push(assets.assets_to_state.clone());
        match &self.fetch_error {
            Some(err) => Err(err.clone()),
            None if self.keep_active => Ok(Assets::with_data(
                echo_payload(assets).data.unwrap_or_default(),
                assets.assets_to_state.iter().map(AssetToState::active).collect(),
            )),
            None => Ok(echo_payload(assets)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings(batch_size: usize) -> SyncerSettings {
    SyncerSettings {
        key: SyncerKey::new("integration", "123"),
        batch_size: NonZeroUsize::new(batch_size).unwrap(),
        max_retry_count: 5,
    }
}

fn build(
    adapter: impl Adapter + 'static,
    tracking: &Arc<MockTrackingService>,
    metrics: &Arc<RecordingMetrics>,
    batch_size: usize,
) -> GenericSyncer {
    GenericSyncer::new(
        settings(batch_size),
        Box::new(adapter),
        Arc::clone(tracking) as Arc<dyn TrackingService>,
        Arc::clone(metrics) as Arc<dyn SyncerMetrics>,
    )
}

fn ids(assets: &[AssetToState]) -> Vec<&str> {
    assets.iter().map(|a| a.asset_id().as_str()).collect()
}

// ---------------------------------------------------------------------------
// Cursor progression
// ---------------------------------------------------------------------------

#[test]
fn round_robin_pages_advance_cursor_and_label() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(RoundRobinAdapter::default(), &tracking, &metrics, 100);

    syncer.sync_once().unwrap();
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(0), CursorLabel::Init)));
    syncer.sync_once().unwrap();
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(1), CursorLabel::Update)));
    syncer.sync_once().unwrap();
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(2), CursorLabel::Update)));

    assert_eq!(
        tracking.sent_data(),
        vec![json!({"data": [0]}), json!({"data": [2]}), json!({"data": [3]})]
    );
    assert_eq!(
        tracking.assets_state(),
        vec![
            vec![AssetToState::new("0", AssetState::Finished)],
            vec![AssetToState::new("2", AssetState::Finished)],
            vec![AssetToState::new("3", AssetState::Finished)],
        ]
    );
}

#[test]
fn restarted_syncer_resumes_from_persisted_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let key = settings(2).key;

    {
        let store: Arc<dyn TrackingService> = Arc::new(SqliteTrackingService::open(&path).unwrap());
        let mut syncer = GenericSyncer::new(
            settings(2),
            Box::new(ListAdapter::new(&["a", "b", "c", "d", "e"])),
            store,
            Arc::new(NoopMetrics),
        );
        let report = syncer.sync_once().unwrap();
        assert_eq!(ids(&report.assets), vec!["a", "b"]);
    }

    let store = Arc::new(SqliteTrackingService::open(&path).unwrap());
    let mut syncer = GenericSyncer::new(
        settings(2),
        Box::new(ListAdapter::new(&["a", "b", "c", "d", "e"])),
        Arc::clone(&store) as Arc<dyn TrackingService>,
        Arc::new(NoopMetrics),
    );
    let report = syncer.sync_once().unwrap();
    assert_eq!(ids(&report.assets), vec!["c", "d"]);
    assert_eq!(
        report.outcome,
        CycleOutcome::Committed {
            cursor: Cursor::new(4),
            label: CursorLabel::Update
        }
    );

    let checkpoint = store.get_last_cursor_and_state(&key).unwrap().unwrap();
    assert_eq!(checkpoint.cursor, Cursor::new(4));
    assert_eq!(
        store.tracking_payloads(&key, 10).unwrap(),
        vec![json!({"data": ["a", "b"]}), json!({"data": ["c", "d"]})]
    );
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn failed_save_leaves_checkpoint_and_resends() {
    let tracking = Arc::new(MockTrackingService::default());
    tracking.fail_save_on_call(2);
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(ListAdapter::new(&["0", "1", "2"]), &tracking, &metrics, 1);

    syncer.sync_once().unwrap();
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(1), CursorLabel::Init)));
    let states_after_first = tracking.assets_state();

    let report = syncer.sync_once().unwrap();
    assert_eq!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: AbortStage::SaveTrackingData,
            message: "tracking service unavailable: test".into()
        }
    );
    // last cursor and asset state untouched after failure
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(1), CursorLabel::Init)));
    assert_eq!(tracking.assets_state(), states_after_first);

    syncer.sync_once().unwrap();
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(2), CursorLabel::Update)));
    assert_eq!(
        tracking.sent_data(),
        vec![json!({"data": [0]}), json!({"data": [1]}), json!({"data": [1]})]
    );
    assert_eq!(
        metrics.count(&Metric::SyncerError("tracking service unavailable: test".into())),
        1
    );
}

#[test]
fn failed_active_load_aborts_without_commit() {
    let tracking = Arc::new(MockTrackingService::default());
    tracking.fail_active_load(true);
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(ListAdapter::new(&["a"]), &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();
    assert!(matches!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: AbortStage::LoadActiveAssets,
            ..
        }
    ));
    assert!(tracking.checkpoint().is_none());
    assert!(tracking.sent_data().is_empty());
    assert_eq!(tracking.cycles().len(), 1);

    tracking.fail_active_load(false);
    let report = syncer.sync_once().unwrap();
    assert!(report.is_committed());
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(1), CursorLabel::Init)));
}

#[test]
fn fetch_error_marks_chunk_failed_and_still_commits() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let mut adapter = ListAdapter::new(&["a", "b"]);
    adapter.fetch_error = Some(AdapterError::transient_network("IO", "boom"));
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();
    assert!(report.is_committed());
    assert_eq!(report.fetch_errors, 1);
    assert_eq!(
        report.assets,
        vec![
            AssetToState::with_retry_count("a", AssetState::FailedRequest, 1),
            AssetToState::with_retry_count("b", AssetState::FailedRequest, 1),
        ]
    );
    assert!(tracking.sent_data().is_empty());
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(2), CursorLabel::Init)));
    assert_eq!(
        metrics.count(&Metric::AssetsDataError(
            "[transient_network] IO: boom".into()
        )),
        1
    );
}

#[test]
fn page_error_syncs_active_assets_and_keeps_cursor() {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": "x", "state": "active"}),
    ]));
    tracking
        .update_last_cursor(&settings(1).key, CursorLabel::Update, &Cursor::new(7))
        .unwrap();
    let metrics = Arc::new(RecordingMetrics::default());
    let mut adapter = ListAdapter::new(&[]);
    adapter.page_error = Some(AdapterError::transient_network("THROTTLED", "slow down"));
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();
    assert!(report.is_committed());
    assert_eq!(report.page_error.as_deref(), Some("[transient_network] THROTTLED: slow down"));
    assert_eq!(ids(&report.assets), vec!["x"]);
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(7), CursorLabel::Update)));
    assert_eq!(
        metrics.count(&Metric::SyncerError("[transient_network] THROTTLED: slow down".into())),
        1
    );
}

#[test]
fn retry_count_grows_until_asset_is_excluded() {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": "x", "state": "failed_request", "data": {"retry_count": 4}}),
    ]));
    let metrics = Arc::new(RecordingMetrics::default());
    let mut adapter = ListAdapter::new(&[]);
    adapter.fetch_error = Some(AdapterError::transient_network("IO", "down"));
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    syncer.sync_once().unwrap();
    syncer.sync_once().unwrap();
    let report = syncer.sync_once().unwrap();

    assert_eq!(
        tracking.assets_state(),
        vec![
            vec![AssetToState::with_retry_count("x", AssetState::FailedRequest, 5)],
            vec![AssetToState::with_retry_count("x", AssetState::FailedRequest, 6)],
        ]
    );
    assert_eq!(report.exhausted, 1);
    assert!(report.assets.is_empty());
    assert_eq!(requests.lock().unwrap().len(), 2);
    assert_eq!(metrics.count(&Metric::MaxRetryRequests(1)), 1);
}

#[test]
fn failed_init_cursor_aborts_before_anything_is_read() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let mut adapter = ListAdapter::new(&["a"]);
    adapter.init_error = Some(AdapterError::transient_network("IO", "source offline"));
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();
    assert_eq!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: AbortStage::InitCursor,
            message: "[transient_network] IO: source offline".into()
        }
    );
    assert!(tracking.checkpoint().is_none());
    assert!(tracking.assets_state().is_empty());
    assert!(tracking.sent_data().is_empty());
    assert!(requests.lock().unwrap().is_empty());
    assert_eq!(
        metrics.count(&Metric::SyncerError("[transient_network] IO: source offline".into())),
        1
    );
}

#[test]
fn failed_state_write_leaves_checkpoint_and_resends() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(ListAdapter::new(&["a", "b"]), &tracking, &metrics, 10);

    tracking.fail_assets_state(true);
    let report = syncer.sync_once().unwrap();
    assert_eq!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: AbortStage::SaveAssetsState,
            message: "tracking service unavailable: asset state write".into()
        }
    );
    assert!(tracking.checkpoint().is_none());
    assert!(tracking.assets_state().is_empty());
    assert!(tracking.record_ids().is_empty());

    tracking.fail_assets_state(false);
    let report = syncer.sync_once().unwrap();
    assert!(report.is_committed());
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(2), CursorLabel::Init)));
    // delivered again, duplicates are allowed
    assert_eq!(
        tracking.sent_data(),
        vec![json!({"data": ["a", "b"]}), json!({"data": ["a", "b"]})]
    );
}

#[test]
fn failed_cursor_write_rereads_page_and_reconciles_by_id() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let mut adapter = ListAdapter::new(&["a", "b", "c"]);
    adapter.keep_active = true;
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, 2);

    syncer.sync_once().unwrap();
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(2), CursorLabel::Init)));

    tracking.fail_cursor_update(true);
    let report = syncer.sync_once().unwrap();
    assert_eq!(
        report.outcome,
        CycleOutcome::Aborted {
            stage: AbortStage::UpdateCursor,
            message: "tracking service unavailable: cursor write".into()
        }
    );
    // states were written, cursor was not
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(2), CursorLabel::Init)));
    assert_eq!(tracking.record_ids(), vec!["a", "b", "c"]);

    tracking.fail_cursor_update(false);
    requests.lock().unwrap().clear();
    let report = syncer.sync_once().unwrap();
    assert!(report.is_committed());
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(3), CursorLabel::Update)));

    let fetched: Vec<Vec<AssetToState>> = requests.lock().unwrap().clone();
    let fetched_ids: Vec<&str> = fetched.iter().flat_map(|chunk| ids(chunk)).collect();
    assert_eq!(fetched_ids, vec!["a", "b", "c"]);
    assert_eq!(ids(&report.assets), vec!["a", "b", "c"]);
    assert_eq!(tracking.record_ids(), vec!["a", "b", "c"]);
}

// ---------------------------------------------------------------------------
// Merge behaviour
// ---------------------------------------------------------------------------

#[test]
fn active_assets_are_fetched_before_new_ones() {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": "A", "state": "active"}),
        json!({"asset_uri": "B", "state": "active"}),
    ]));
    let metrics = Arc::new(RecordingMetrics::default());
    let adapter = ListAdapter::new(&["C"]);
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    syncer.sync_once().unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(ids(&requests[0]), vec!["A", "B", "C"]);
}

#[test]
fn overlapping_discovery_keeps_active_retry_history() {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": "A", "state": "failed_request", "data": {"retry_count": 2}}),
    ]));
    let metrics = Arc::new(RecordingMetrics::default());
    let adapter = ListAdapter::new(&["A", "C"]);
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();

    assert_eq!(
        requests.lock().unwrap()[0],
        vec![
            AssetToState::with_retry_count("A", AssetState::FailedRequest, 2),
            AssetToState::init("C"),
        ]
    );
    assert_eq!(
        report.assets,
        vec![
            AssetToState::with_retry_count("A", AssetState::FailedRequest, 3),
            AssetToState::new("C", AssetState::Finished),
        ]
    );
}

#[test]
fn unknown_persisted_state_is_skipped() {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": 3, "state": "wow", "data": {"retry_count": 2}}),
        json!({"asset_uri": 4, "state": "active"}),
        json!({"asset_uri": 5, "state": "active"}),
    ]));
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(ListAdapter::new(&[]), &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();
    assert_eq!(report.skipped_records, 1);
    assert_eq!(
        tracking.assets_state(),
        vec![vec![
            AssetToState::new("4", AssetState::Finished),
            AssetToState::new("5", AssetState::Finished),
        ]]
    );
    assert_eq!(tracking.sent_data(), vec![json!({"data": [4, 5]})]);
}

#[test]
fn nothing_to_fetch_sends_nothing() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let adapter = ListAdapter::new(&[]);
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();
    assert!(report.is_committed());
    assert!(tracking.sent_data().is_empty());
    assert!(tracking.assets_state().is_empty());
    assert!(requests.lock().unwrap().is_empty());
    assert_eq!(tracking.checkpoint(), Some((Cursor::new(0), CursorLabel::Init)));
}

#[rstest]
#[case(1, 3)]
#[case(2, 2)]
#[case(3, 1)]
fn fetch_is_chunked_by_batch_size(#[case] batch_size: usize, #[case] chunks: usize) {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": "a", "state": "active"}),
        json!({"asset_uri": "b", "state": "active"}),
        json!({"asset_uri": "c", "state": "active"}),
    ]));
    let metrics = Arc::new(RecordingMetrics::default());
    let adapter = ListAdapter::new(&[]);
    let requests = Arc::clone(&adapter.requests);
    let mut syncer = build(adapter, &tracking, &metrics, batch_size);

    syncer.sync_once().unwrap();

    assert_eq!(requests.lock().unwrap().len(), chunks);
    assert_eq!(tracking.sent_data().len(), chunks);
    assert_eq!(metrics.count(&Metric::Batch), chunks);
    assert_eq!(metrics.count(&Metric::GetAssetsData), chunks);
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[test]
fn cycle_emits_timing_and_size_metrics() {
    let tracking = Arc::new(MockTrackingService::default());
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(RoundRobinAdapter::default(), &tracking, &metrics, 100);

    syncer.sync_once().unwrap();

    let payload_len = serde_json::to_string(&json!({"data": [0]})).unwrap().len();
    let events = metrics.events();
    assert_eq!(metrics.count(&Metric::SyncOnce), 1);
    assert_eq!(metrics.count(&Metric::SaveTrackingData), 1);
    assert!(events.contains(&Metric::TotalAssetsSize(1)));
    assert!(events.contains(&Metric::BatchSizeBytes(payload_len)));
    assert!(events.contains(&Metric::FailedRequests(0)));
    assert!(events.contains(&Metric::MaxRetryRequests(0)));
}

#[test]
fn failed_and_max_retry_gauges_count_loaded_assets() {
    let tracking = Arc::new(MockTrackingService::with_active(vec![
        json!({"asset_uri": 3, "state": "failed_request", "data": {"retry_count": 1}}),
        json!({"asset_uri": 4, "state": "failed_request", "data": {"retry_count": 1}}),
        json!({"asset_uri": 5, "state": "failed_request", "data": {"retry_count": 6}}),
        json!({"asset_uri": 6, "state": "failed_request", "data": {"retry_count": 6}}),
    ]));
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(ListAdapter::new(&[]), &tracking, &metrics, 10);

    let report = syncer.sync_once().unwrap();

    let events = metrics.events();
    assert!(events.contains(&Metric::FailedRequests(2)));
    assert!(events.contains(&Metric::MaxRetryRequests(2)));
    assert!(events.contains(&Metric::TotalAssetsSize(2)));
    assert_eq!(ids(&report.assets), vec!["3", "4"]);
}

#[test]
fn cycle_history_is_recorded_for_aborts_too() {
    let tracking = Arc::new(MockTrackingService::default());
    tracking.fail_save_on_call(1);
    let metrics = Arc::new(RecordingMetrics::default());
    let mut syncer = build(ListAdapter::new(&["a"]), &tracking, &metrics, 10);

    syncer.sync_once().unwrap();
    syncer.sync_once().unwrap();

    let cycles = tracking.cycles();
    assert_eq!(cycles.len(), 2);
    assert_eq!(
        cycles[0].error_message.as_deref(),
        Some("save_tracking_data: tracking service unavailable: test")
    );
    assert!(cycles[1].error_message.is_none());
    assert_eq!(cycles[1].assets_finished, 1);
}
