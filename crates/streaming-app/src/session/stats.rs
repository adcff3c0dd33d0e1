//! Send and receive counters for a streaming session.

use std::time::Duration;

/// Counters kept by one session.
///
/// Sent and received totals only ever grow. The delay accumulator is the
/// exception: [`SessionStats::take_delay`] drains it, so callers sampling
/// on an interval get the delay sum for that interval only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Bytes handed to the transport.
    pub total_bytes_sent: u64,
    /// Packets handed to the transport.
    pub packets_sent: u64,
    /// Bytes received, across all peers.
    pub total_bytes_received: u64,
    /// Non-empty datagrams received.
    pub packets_received: u64,
    /// Received datagrams whose header could not be decoded.
    pub malformed_received: u64,
    /// Sends rejected by the transport.
    pub send_failures: u64,
    accumulated_delay: Duration,
}

impl SessionStats {
    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.total_bytes_sent = self
            .total_bytes_sent
            .saturating_add(u64::try_from(bytes).unwrap_or(u64::MAX));
        self.packets_sent = self.packets_sent.saturating_add(1);
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.total_bytes_received = self
            .total_bytes_received
            .saturating_add(u64::try_from(bytes).unwrap_or(u64::MAX));
        self.packets_received = self.packets_received.saturating_add(1);
    }

    pub(crate) fn add_delay(&mut self, delay: Duration) {
        self.accumulated_delay = self.accumulated_delay.saturating_add(delay);
    }

    /// Delay summed since the last drain, without resetting it.
    #[must_use]
    pub fn peek_delay(&self) -> Duration {
        self.accumulated_delay
    }

    /// Return the delay summed since the last drain and reset it to zero.
    pub fn take_delay(&mut self) -> Duration {
        std::mem::take(&mut self.accumulated_delay)
    }

    /// Whether `max_bytes` (non-zero) has been reached.
    #[must_use]
    pub fn budget_exhausted(&self, max_bytes: u64) -> bool {
        max_bytes != 0 && self.total_bytes_sent >= max_bytes
    }
}
