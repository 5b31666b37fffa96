//! Metrics collection and exposition.
//!
//! # Metrics
//! - `range_guard_connections_total` (counter): accepted client connections
//! - `range_guard_active_connections` (gauge): live proxied sessions
//! - `range_guard_verdicts_total` (counter): inspector verdicts by peer, verdict
//! - `range_guard_terminations_total` (counter): session endings by reason
//! - `range_guard_bytes_forwarded_total` (counter): bytes handed to the
//!   transport by direction
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Prometheus exposition is opt-in via config

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::inspection::Verdict;
use crate::proxy::pipe::{Direction, Peer};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_connection_opened() {
    counter!("range_guard_connections_total").increment(1);
    gauge!("range_guard_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("range_guard_active_connections").decrement(1.0);
}

pub fn record_verdict(peer: Peer, verdict: Verdict) {
    counter!(
        "range_guard_verdicts_total",
        "peer" => peer.as_str(),
        "verdict" => verdict.label()
    )
    .increment(1);
}

pub fn record_termination(reason: &'static str) {
    counter!("range_guard_terminations_total", "reason" => reason).increment(1);
}

pub fn record_forwarded(direction: Direction, bytes: usize) {
    counter!("range_guard_bytes_forwarded_total", "direction" => direction.as_str())
        .increment(bytes as u64);
}
