//! Metrics collection.
//!
//! # Metrics
//! - `fakenet_listeners_active` (gauge): listeners open on any network
//! - `fakenet_connections_total` (counter): connection pairs created by accept
//! - `fakenet_connections_active` (gauge): connection pairs not yet torn down
//! - `fakenet_dial_failures_total` (counter): failed dials by reason
//! - `fakenet_bytes_transferred_total` (counter): payload bytes handed off
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op, so the library never installs an exporter

pub fn record_listener_opened() {
    ::metrics::gauge!("fakenet_listeners_active").increment(1.0);
}

pub fn record_listener_closed() {
    ::metrics::gauge!("fakenet_listeners_active").decrement(1.0);
}

pub fn record_connection_opened() {
    ::metrics::counter!("fakenet_connections_total").increment(1);
    ::metrics::gauge!("fakenet_connections_active").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("fakenet_connections_active").decrement(1.0);
}

pub fn record_dial_failure(reason: &'static str) {
    ::metrics::counter!("fakenet_dial_failures_total", "reason" => reason).increment(1);
}

pub fn record_bytes(len: usize) {
    ::metrics::counter!("fakenet_bytes_transferred_total").increment(len as u64);
}
