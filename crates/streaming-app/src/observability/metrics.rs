//! Metrics for streaming sessions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `stream_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `role`: 2 values (server, client)
//! - `kind`: bounded by `TransportError::kind` (5 values)
//!
//! Recording is a no-op until a recorder is installed, so sessions can be
//! driven in tests without one.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a packet handed to the transport.
///
/// Metrics: `stream_packets_sent_total`, `stream_bytes_sent_total`
/// Labels: `role`
pub fn record_packet_sent(role: &'static str, bytes: usize) {
    counter!("stream_packets_sent_total", "role" => role).increment(1);
    counter!("stream_bytes_sent_total", "role" => role)
        .increment(u64::try_from(bytes).unwrap_or(u64::MAX));
}

/// Record a received datagram.
///
/// Metrics: `stream_packets_received_total`, `stream_bytes_received_total`
/// Labels: `role`
pub fn record_packet_received(role: &'static str, bytes: usize) {
    counter!("stream_packets_received_total", "role" => role).increment(1);
    counter!("stream_bytes_received_total", "role" => role)
        .increment(u64::try_from(bytes).unwrap_or(u64::MAX));
}

/// Record the one-way delay of a received frame.
///
/// Metric: `stream_packet_delay_seconds`
/// Labels: `role`
pub fn record_packet_delay(role: &'static str, delay: Duration) {
    histogram!("stream_packet_delay_seconds", "role" => role).record(delay.as_secs_f64());
}

/// Record a datagram whose header could not be decoded.
///
/// Metric: `stream_malformed_frames_total`
/// Labels: `role`
pub fn record_malformed_frame(role: &'static str) {
    counter!("stream_malformed_frames_total", "role" => role).increment(1);
}

/// Record a server switching its stream to a new peer.
///
/// Metric: `stream_peer_switches_total`
/// Labels: none (server only)
pub fn record_peer_switch() {
    counter!("stream_peer_switches_total").increment(1);
}

/// Record a server pausing after its liveness window expired.
///
/// Metric: `stream_liveness_timeouts_total`
/// Labels: none (server only)
pub fn record_liveness_timeout() {
    counter!("stream_liveness_timeouts_total").increment(1);
}

/// Record a failed transport operation.
///
/// Metric: `stream_transport_errors_total`
/// Labels: `role`, `kind`
pub fn record_transport_error(role: &'static str, kind: &'static str) {
    counter!("stream_transport_errors_total", "role" => role, "kind" => kind).increment(1);
}
