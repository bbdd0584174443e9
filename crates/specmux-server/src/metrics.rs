//! Prometheus exporter installation and metric names.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::info;

/// Install the global Prometheus recorder with a scrape listener on `addr`.
///
/// Must be called once at startup before any metrics are recorded. Without
/// it every metric call is a no-op.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

// Metric name constants to avoid typos across crates.

/// Connections established total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections closed by the peer total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections torn down after a failed or partial write (counter).
pub const WS_WRITE_FAILURES_TOTAL: &str = "ws_write_failures_total";
/// Messages fully handed to the transport (counter).
pub const WS_MESSAGES_SENT_TOTAL: &str = "ws_messages_sent_total";
/// Messages enqueued by broadcasts, summed over recipients (counter).
pub const WS_BROADCAST_RECIPIENTS_TOTAL: &str = "ws_broadcast_recipients_total";
/// Messages dropped because a connection queue was full (counter).
pub const WS_QUEUE_DROPS_TOTAL: &str = "ws_queue_drops_total";
/// Producer iterations skipped by the backpressure gate (counter).
pub const SPECTRUM_BATCHES_SKIPPED_TOTAL: &str = "spectrum_batches_skipped_total";
/// Spectrum messages published (counter).
pub const SPECTRUM_PUBLISHED_TOTAL: &str = "spectrum_published_total";
/// Estimator failures (counter).
pub const SPECTRUM_ESTIMATOR_FAILURES_TOTAL: &str = "spectrum_estimator_failures_total";
