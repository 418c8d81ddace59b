//! Metrics collection and export for Beacon.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use beacon_core::{ErrorSink, SpaceError, SpacesStats};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "beacon_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "beacon_connections_active";
    pub const FRAMES_TOTAL: &str = "beacon_frames_total";
    pub const FRAMES_BYTES: &str = "beacon_frames_bytes";
    pub const SPACES_ACTIVE: &str = "beacon_spaces_active";
    pub const SPACE_USERS: &str = "beacon_space_users";
    pub const LATENCY_SECONDS: &str = "beacon_latency_seconds";
    pub const ERRORS_TOTAL: &str = "beacon_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of relay connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of relay connections"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of frames processed");
    metrics::describe_gauge!(names::SPACES_ACTIVE, "Current number of spaces");
    metrics::describe_gauge!(names::SPACE_USERS, "Current number of users across spaces");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound message processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAMES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Publish registry gauges.
pub fn set_space_stats(stats: &SpacesStats) {
    gauge!(names::SPACES_ACTIVE).set(stats.space_count as f64);
    gauge!(names::SPACE_USERS).set(stats.user_count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metric label for a space error.
#[must_use]
pub fn error_type(error: &SpaceError) -> &'static str {
    match error {
        SpaceError::InvalidSpaceName(_) => "invalid_space_name",
        SpaceError::UnknownSpace(_) => "unknown_space",
        SpaceError::UnknownWatcher { .. } => "unknown_watcher",
        SpaceError::UnknownUser { .. } => "unknown_user",
        SpaceError::EmptyFilter { .. } => "empty_filter",
        SpaceError::MaxSpacesReached => "max_spaces",
        SpaceError::UnexpectedFrame(_) => "unexpected_frame",
    }
}

/// Error sink that logs anomalies and counts them.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsErrorSink;

impl ErrorSink for MetricsErrorSink {
    fn report(&self, err: &SpaceError) {
        error!(error = %err, "Space anomaly");
        record_error(error_type(err));
    }
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
