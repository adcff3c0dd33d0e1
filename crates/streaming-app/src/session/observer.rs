//! Packet trace hooks.
//!
//! Observers see every frame a session sends or receives together with the
//! endpoint pair. They are notification-only: a session behaves the same
//! with or without them.

use crate::runtime::{Endpoint, SimTime};
use std::cell::RefCell;
use std::rc::Rc;
use stream_protocol::StreamFrame;

/// Receives per-packet trace events from a session.
pub trait SessionObserver {
    /// A frame was handed to the transport.
    fn on_packet_sent(
        &mut self,
        _at: SimTime,
        _frame: &StreamFrame,
        _local: Option<Endpoint>,
        _peer: Endpoint,
    ) {
    }

    /// A frame was received and decoded.
    fn on_packet_received(
        &mut self,
        _at: SimTime,
        _frame: &StreamFrame,
        _from: Endpoint,
        _local: Option<Endpoint>,
    ) {
    }
}

/// Direction of a recorded trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    Tx,
    Rx,
}

/// One recorded packet event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub direction: TraceDirection,
    pub at: SimTime,
    pub frame: StreamFrame,
    /// Sender address.
    pub source: Option<Endpoint>,
    /// Receiver address.
    pub destination: Option<Endpoint>,
}

/// Observer that keeps every event in memory.
///
/// Clones share the same log, so a test can keep one clone and hand the
/// other to the session.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    /// Events in one direction.
    #[must_use]
    pub fn events_in(&self, direction: TraceDirection) -> Vec<TraceEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.direction == direction)
            .cloned()
            .collect()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_packet_sent(
        &mut self,
        at: SimTime,
        frame: &StreamFrame,
        local: Option<Endpoint>,
        peer: Endpoint,
    ) {
        self.events.borrow_mut().push(TraceEvent {
            direction: TraceDirection::Tx,
            at,
            frame: frame.clone(),
            source: local,
            destination: Some(peer),
        });
    }

    fn on_packet_received(
        &mut self,
        at: SimTime,
        frame: &StreamFrame,
        from: Endpoint,
        local: Option<Endpoint>,
    ) {
        self.events.borrow_mut().push(TraceEvent {
            direction: TraceDirection::Rx,
            at,
            frame: frame.clone(),
            source: Some(from),
            destination: local,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let recorder = RecordingObserver::new();
        let mut handed_off = recorder.clone();
        let peer: Endpoint = "10.0.0.2:1000".parse().unwrap();

        handed_off.on_packet_sent(SimTime::from_millis(5), &StreamFrame::default(), None, peer);
        handed_off.on_packet_received(SimTime::from_millis(9), &StreamFrame::default(), peer, None);

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.events_in(TraceDirection::Tx).len(), 1);
        let rx = recorder.events_in(TraceDirection::Rx);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx[0].source, Some(peer));
    }
}
