//! Collaborator interfaces consumed by the streaming session.
//!
//! The session never advances time or moves datagrams itself. A driver
//! (a simulation kernel, or the in-process [`crate::sim`] harness) hands it
//! a [`Scheduler`] on every callback and owns the event loop; the session
//! owns one [`Transport`] handle per running application.
//!
//! Everything here is single-threaded: callbacks run to completion on one
//! logical timeline, so nothing needs to be `Send` or `Sync`.

use crate::errors::TransportError;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Transport address of a session or its peer.
pub type Endpoint = SocketAddr;

/// Virtual simulation time with nanosecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    /// Start of the simulated timeline.
    pub const ZERO: SimTime = SimTime(0);

    /// Time from nanoseconds since the start of the timeline.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Time from whole milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Time from fractional seconds. Negative or NaN inputs clamp to zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1e9).round() as u64)
    }

    /// Nanoseconds since the start of the timeline.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Seconds since the start of the timeline.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is later.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        SimTime(self.0.saturating_add(nanos))
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Opaque handle to a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Which session callback a timer runs when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Pacing timer: emit the next packet.
    Send,
    /// Server keep-alive window expired: pause emission.
    Liveness,
}

impl TimerKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Send => "send",
            TimerKind::Liveness => "liveness",
        }
    }
}

/// Virtual clock and timer service.
///
/// When a timer fires, the driver calls
/// [`StreamingSession::handle_timer`](crate::session::StreamingSession::handle_timer)
/// with the same kind and handle. Cancelling a handle that already fired
/// or was already cancelled must be a no-op.
pub trait Scheduler {
    /// Current virtual time.
    fn now(&self) -> SimTime;

    /// Arrange for a `kind` callback `delay` from now.
    fn schedule_after(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle;

    /// Cancel a pending callback.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Datagram endpoint owned by a session.
///
/// All operations return immediately. Readiness is signalled out of band:
/// the driver invokes the session's `on_data_available`,
/// `on_connect_succeeded`/`on_connect_failed`, `on_peer_accepted` and
/// `on_peer_closed` methods.
pub trait Transport {
    /// Bind to `local`; port 0 picks an ephemeral port. Returns the bound address.
    fn bind(&mut self, local: Endpoint) -> Result<Endpoint, TransportError>;

    /// Set the default destination (datagram) or start a handshake (stream).
    fn connect(&mut self, peer: Endpoint) -> Result<(), TransportError>;

    /// Send one datagram to the connected peer. Returns bytes accepted.
    fn send(&mut self, datagram: Bytes) -> Result<usize, TransportError>;

    /// Pop the next queued datagram and its source, if any.
    fn recv_from(&mut self) -> Option<(Bytes, Endpoint)>;

    /// Locally bound address.
    fn local_addr(&self) -> Option<Endpoint>;

    /// Connected peer address.
    fn peer_addr(&self) -> Option<Endpoint>;

    /// Release the handle. Further calls fail with `Closed`.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_time_arithmetic() {
        let start = SimTime::from_millis(1_900);
        let later = start + Duration::from_millis(250);

        assert_eq!(later.as_nanos(), 2_150_000_000);
        assert_eq!(later - start, Duration::from_millis(250));
        // Subtraction never goes negative
        assert_eq!(start - later, Duration::ZERO);
    }

    #[test]
    fn test_sim_time_from_secs() {
        assert_eq!(SimTime::from_secs_f64(0.1), SimTime::from_millis(100));
        assert_eq!(SimTime::from_secs_f64(-3.0), SimTime::ZERO);
        assert_eq!(SimTime::from_secs_f64(f64::NAN), SimTime::ZERO);
        assert_eq!(format!("{}", SimTime::from_millis(1_500)), "1.500000s");
    }

    #[test]
    fn test_add_saturates() {
        let end = SimTime::from_nanos(u64::MAX - 1) + Duration::from_secs(5);
        assert_eq!(end.as_nanos(), u64::MAX);
    }
}
