//! Syncer metrics boundary.
//!
//! [`SyncerMetrics`] is what the syncer reports through. [`PrometheusMetrics`]
//! records into the global `metrics` facade, which the CLI exports over HTTP
//! when `metrics.listen` is configured. [`NoopMetrics`] drops everything.
//!
//! Every series carries the `integration_id` and `syncer_instance_id`
//! labels; error counters add `error_message`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracksync_types::SyncerKey;

pub const SYNC_ONCE_TOTAL_DURATION: &str = "generic_syncer_sync_once_total_duration_seconds";
pub const SYNC_ONCE_BATCH_DURATION: &str = "generic_syncer_sync_once_batch_duration_seconds";
pub const SAVE_TRACKING_DATA_RESPONSE_TIME: &str =
    "generic_syncer_save_tracking_data_response_time_seconds";
pub const GET_ASSETS_DATA_RESPONSE_TIME: &str =
    "generic_syncer_get_assets_data_response_time_seconds";
pub const TOTAL_ASSETS_SIZE: &str = "generic_syncer_total_assets_size";
pub const ASSETS_DATA_BATCH_SIZE_BYTES: &str = "generic_syncer_assets_data_batch_size_bytes";
pub const ASSETS_DATA_ERROR_COUNTER: &str = "generic_syncer_assets_data_error_counter";
pub const SYNCER_ERROR_COUNTER: &str = "generic_syncer_error_counter";
pub const TOTAL_FAILED_ASSETS_REQUESTS: &str = "generic_syncer_total_failed_assets_requests";
pub const TOTAL_MAX_RETRY_ASSETS_REQUESTS: &str = "generic_syncer_total_max_retry_assets_requests";

/// Everything a sync cycle reports.
pub trait SyncerMetrics: Send + Sync {
    fn sync_once_duration(&self, elapsed: Duration);
    fn batch_duration(&self, elapsed: Duration);
    fn get_assets_data_response_time(&self, elapsed: Duration);
    fn save_tracking_data_response_time(&self, elapsed: Duration);
    fn total_assets_size(&self, count: usize);
    fn assets_data_batch_size_bytes(&self, bytes: usize);
    fn assets_data_error(&self, message: &str);
    fn syncer_error(&self, message: &str);
    fn failed_assets_requests(&self, count: usize);
    fn max_retry_assets_requests(&self, count: usize);
}

/// Discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl SyncerMetrics for NoopMetrics {
    fn sync_once_duration(&self, _elapsed: Duration) {}
    fn batch_duration(&self, _elapsed: Duration) {}
    fn get_assets_data_response_time(&self, _elapsed: Duration) {}
    fn save_tracking_data_response_time(&self, _elapsed: Duration) {}
    fn total_assets_size(&self, _count: usize) {}
    fn assets_data_batch_size_bytes(&self, _bytes: usize) {}
    fn assets_data_error(&self, _message: &str) {}
    fn syncer_error(&self, _message: &str) {}
    fn failed_assets_requests(&self, _count: usize) {}
    fn max_retry_assets_requests(&self, _count: usize) {}
}

/// Records into the global `metrics` recorder, labelled with one syncer's
/// identity.
#[derive(Debug, Clone)]
pub struct PrometheusMetrics {
    integration_id: String,
    syncer_instance_id: String,
}

impl PrometheusMetrics {
    #[must_use]
    pub fn new(key: &SyncerKey) -> Self {
        Self {
            integration_id: key.integration_id.to_string(),
            syncer_instance_id: key.syncer_instance_id.to_string(),
        }
    }

    fn histogram(&self, name: &'static str, value: f64) {
        histogram!(
            name,
            "integration_id" => self.integration_id.clone(),
            "syncer_instance_id" => self.syncer_instance_id.clone()
        )
        .record(value);
    }

    #[allow(clippy::cast_precision_loss)]
    fn gauge(&self, name: &'static str, value: usize) {
        gauge!(
            name,
            "integration_id" => self.integration_id.clone(),
            "syncer_instance_id" => self.syncer_instance_id.clone()
        )
        .set(value as f64);
    }

    fn error(&self, name: &'static str, message: &str) {
        counter!(
            name,
            "integration_id" => self.integration_id.clone(),
            "syncer_instance_id" => self.syncer_instance_id.clone(),
            "error_message" => message.to_string()
        )
        .increment(1);
    }
}

impl SyncerMetrics for PrometheusMetrics {
    fn sync_once_duration(&self, elapsed: Duration) {
        self.histogram(SYNC_ONCE_TOTAL_DURATION, elapsed.as_secs_f64());
    }

    fn batch_duration(&self, elapsed: Duration) {
        self.histogram(SYNC_ONCE_BATCH_DURATION, elapsed.as_secs_f64());
    }

    fn get_assets_data_response_time(&self, elapsed: Duration) {
        self.histogram(GET_ASSETS_DATA_RESPONSE_TIME, elapsed.as_secs_f64());
    }

    fn save_tracking_data_response_time(&self, elapsed: Duration) {
        self.histogram(SAVE_TRACKING_DATA_RESPONSE_TIME, elapsed.as_secs_f64());
    }

    fn total_assets_size(&self, count: usize) {
        self.gauge(TOTAL_ASSETS_SIZE, count);
    }

    #[allow(clippy::cast_precision_loss)]
    fn assets_data_batch_size_bytes(&self, bytes: usize) {
        self.histogram(ASSETS_DATA_BATCH_SIZE_BYTES, bytes as f64);
    }

    fn assets_data_error(&self, message: &str) {
        self.error(ASSETS_DATA_ERROR_COUNTER, message);
    }

    fn syncer_error(&self, message: &str) {
        self.error(SYNCER_ERROR_COUNTER, message);
    }

    fn failed_assets_requests(&self, count: usize) {
        self.gauge(TOTAL_FAILED_ASSETS_REQUESTS, count);
    }

    fn max_retry_assets_requests(&self, count: usize) {
        self.gauge(TOTAL_MAX_RETRY_ASSETS_REQUESTS, count);
    }
}

/// Install the Prometheus recorder with an HTTP listener on `listen` and
/// register metric descriptions.
///
/// Must be called from within a tokio runtime, at most once per process.
///
/// # Errors
///
/// Returns an error if the listener can't bind or a recorder is already
/// installed.
pub fn install_prometheus_exporter(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .with_context(|| format!("Failed to start Prometheus exporter on {listen}"))?;
    describe_syncer_metrics();
    tracing::info!(listen = %listen, "Metrics exporter listening on /metrics");
    Ok(())
}

fn describe_syncer_metrics() {
    describe_histogram!(
        SYNC_ONCE_TOTAL_DURATION,
        Unit::Seconds,
        "Duration of one sync_once cycle"
    );
    describe_histogram!(
        SYNC_ONCE_BATCH_DURATION,
        Unit::Seconds,
        "Duration of fetching and forwarding one batch"
    );
    describe_histogram!(
        SAVE_TRACKING_DATA_RESPONSE_TIME,
        Unit::Seconds,
        "Tracking service response time for save_tracking_data"
    );
    describe_histogram!(
        GET_ASSETS_DATA_RESPONSE_TIME,
        Unit::Seconds,
        "Adapter response time for get_assets_data"
    );
    describe_gauge!(TOTAL_ASSETS_SIZE, "Number of assets fetched in the last cycle");
    describe_histogram!(
        ASSETS_DATA_BATCH_SIZE_BYTES,
        Unit::Bytes,
        "Serialized size of each forwarded payload"
    );
    describe_counter!(ASSETS_DATA_ERROR_COUNTER, "Failed get_assets_data calls");
    describe_counter!(SYNCER_ERROR_COUNTER, "Aborted cycles and failed discovery pages");
    describe_gauge!(
        TOTAL_FAILED_ASSETS_REQUESTS,
        "Active assets whose last fetch failed, within the retry budget"
    );
    describe_gauge!(
        TOTAL_MAX_RETRY_ASSETS_REQUESTS,
        "Assets excluded after exceeding the retry budget"
    );
}
