//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_contexts_total` (counter): accepted contexts by listener kind
//! - `switchyard_context_errors_total` (counter): failed contexts by state
//! - `switchyard_active_contexts` (gauge): contexts currently alive
//! - `switchyard_keepalive_reuses_total` (counter): re-armed receive cycles
//! - `switchyard_websocket_upgrades_total` (counter): completed upgrades
//! - `switchyard_open_websockets` (gauge): registered WebSockets
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ListenerKind;
use crate::context::ContextState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_context_accepted(kind: ListenerKind) {
    counter!("switchyard_contexts_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_context_error(state: ContextState) {
    counter!("switchyard_context_errors_total", "state" => state.as_str()).increment(1);
}

pub fn set_active_contexts(count: u64) {
    gauge!("switchyard_active_contexts").set(count as f64);
}

pub fn record_keepalive_reuse() {
    counter!("switchyard_keepalive_reuses_total").increment(1);
}

pub fn record_websocket_upgrade() {
    counter!("switchyard_websocket_upgrades_total").increment(1);
}

pub fn set_open_websockets(count: usize) {
    gauge!("switchyard_open_websockets").set(count as f64);
}
