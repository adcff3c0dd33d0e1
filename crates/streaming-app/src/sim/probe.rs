//! Periodic throughput and delay sampling.

use super::AppId;
use crate::runtime::{SimTime, Transport};
use crate::session::StreamingSession;
use std::time::Duration;

/// One probe sample covering the interval ending at `at`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    pub at: SimTime,
    /// Bytes received during the interval.
    pub bytes: u64,
    /// Packets received during the interval.
    pub packets: u64,
    /// Received throughput over the interval, in Mb/s.
    pub mbps: f64,
    /// Mean one-way delay of packets received during the interval.
    pub mean_delay: Option<Duration>,
}

/// Samples a receiving session every `interval`.
///
/// Each sample drains the session's delay accumulator, so a session should
/// have at most one probe.
#[derive(Debug, Clone)]
pub struct ThroughputProbe {
    app: AppId,
    interval: Duration,
    last_bytes: u64,
    last_packets: u64,
    samples: Vec<ThroughputSample>,
}

impl ThroughputProbe {
    #[must_use]
    pub fn new(app: AppId, interval: Duration) -> Self {
        Self {
            app,
            interval,
            last_bytes: 0,
            last_packets: 0,
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub fn app(&self) -> AppId {
        self.app
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    /// Take a sample of `session` at `at`.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample<T: Transport>(
        &mut self,
        at: SimTime,
        session: &mut StreamingSession<T>,
    ) {
        let bytes = session.total_bytes_received();
        let packets = session.total_packets_received();
        let delay = session.total_delay_since_last_read();

        let delta_bytes = bytes.saturating_sub(self.last_bytes);
        let delta_packets = packets.saturating_sub(self.last_packets);
        self.last_bytes = bytes;
        self.last_packets = packets;

        let secs = self.interval.as_secs_f64();
        let mbps = if secs > 0.0 {
            delta_bytes as f64 * 8.0 / secs / 1e6
        } else {
            0.0
        };
        let mean_delay = u32::try_from(delta_packets)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| delay / n);

        self.samples.push(ThroughputSample {
            at,
            bytes: delta_bytes,
            packets: delta_packets,
            mbps,
            mean_delay,
        });
    }

    /// Most recent sample.
    #[must_use]
    pub fn latest(&self) -> Option<&ThroughputSample> {
        self.samples.last()
    }
}
