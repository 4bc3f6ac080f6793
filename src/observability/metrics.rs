//! Metrics for `roguewire`.
//!
//! Counters and histograms are recorded through the `metrics` facade and cost
//! nothing until a recorder is installed with [`init_metrics`]. Labels are
//! always mode names, which form a closed set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::HarnessError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `HarnessError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), HarnessError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| HarnessError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!(
        "roguewire_sessions_total",
        "Listener sessions started, by mode"
    );
    describe_counter!(
        "roguewire_connections_total",
        "Connections accepted, by mode"
    );
    describe_counter!(
        "roguewire_connection_errors_total",
        "Connections that ended with an I/O error, by mode"
    );
    describe_histogram!(
        "roguewire_probe_duration_ms",
        "Time the caller's probe ran against the server"
    );
}

/// Records a listener session starting.
pub fn record_session(mode: &'static str) {
    counter!("roguewire_sessions_total", "mode" => mode).increment(1);
}

/// Records an accepted connection.
pub fn record_connection(mode: &'static str) {
    counter!("roguewire_connections_total", "mode" => mode).increment(1);
}

/// Records a connection that ended with an I/O error.
pub fn record_connection_error(mode: &'static str) {
    counter!("roguewire_connection_errors_total", "mode" => mode).increment(1);
}

/// Records how long a probe ran.
pub fn record_probe_duration(mode: &'static str, duration: Duration) {
    histogram!("roguewire_probe_duration_ms", "mode" => mode)
        .record(duration.as_secs_f64() * 1000.0);
}
