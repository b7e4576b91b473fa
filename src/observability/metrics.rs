//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monte_connections_accepted_total` (counter): connections admitted by a server
//! - `monte_connections_rejected_total` (counter): connections closed for lack of a slot
//! - `monte_handshake_failures_total` (counter): handshakes that failed or timed out
//! - `monte_active_connections` (gauge): connections currently being handled
//! - `monte_frames_sent_total` (counter): frames written to secured streams
//! - `monte_frames_received_total` (counter): frames read from secured streams
//! - `monte_request_timeouts_total` (counter): requests abandoned after their deadline
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in and installed by the binary

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve Prometheus metrics on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_accepted() {
    counter!("monte_connections_accepted_total").increment(1);
}

pub fn connection_rejected() {
    counter!("monte_connections_rejected_total").increment(1);
}

pub fn handshake_failed() {
    counter!("monte_handshake_failures_total").increment(1);
}

/// Marks one connection as active until the returned guard drops.
pub fn active_connection() -> ActiveConnection {
    gauge!("monte_active_connections").increment(1.0);
    ActiveConnection
}

#[derive(Debug)]
pub struct ActiveConnection;

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        gauge!("monte_active_connections").decrement(1.0);
    }
}

pub fn frames_sent(count: usize) {
    counter!("monte_frames_sent_total").increment(count as u64);
}

pub fn frame_received() {
    counter!("monte_frames_received_total").increment(1);
}

pub fn request_timed_out() {
    counter!("monte_request_timeouts_total").increment(1);
}
