//! Receive path: drain the transport, account every datagram, and (server)
//! follow the requesting peer.

use super::{RoleState, SessionState, StreamingSession};
use crate::observability::metrics;
use crate::runtime::{Endpoint, Scheduler, SimTime, TimerKind, Transport};
use bytes::Bytes;
use stream_protocol::decode_frame;
use tracing::{debug, info, trace, warn};

impl<T: Transport> StreamingSession<T> {
    /// Drain every datagram queued on the transport.
    ///
    /// A zero-length datagram ends the drain. A server treats each datagram
    /// as a request from its sender.
    pub fn on_data_available(&mut self, scheduler: &mut dyn Scheduler) {
        loop {
            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            let Some((datagram, from)) = transport.recv_from() else {
                break;
            };
            if datagram.is_empty() {
                trace!(node = self.node_id, %from, "Empty datagram, ending drain");
                break;
            }
            let local = transport.local_addr();

            self.record_received(&datagram, from, local, scheduler.now());
            if matches!(self.role, RoleState::Server(_)) {
                self.on_request(from, scheduler);
            }
        }
    }

    fn record_received(
        &mut self,
        datagram: &Bytes,
        from: Endpoint,
        local: Option<Endpoint>,
        now: SimTime,
    ) {
        let role = self.config.role.as_str();
        self.stats.record_received(datagram.len());
        metrics::record_packet_received(role, datagram.len());

        let mut buf = datagram.clone();
        match decode_frame(&mut buf) {
            Ok(frame) => {
                let delay = now.saturating_duration_since(SimTime::from_nanos(frame.timestamp_ns));
                self.stats.add_delay(delay);
                metrics::record_packet_delay(role, delay);
                trace!(
                    role,
                    node = self.node_id,
                    seq = frame.sequence,
                    bytes = datagram.len(),
                    %from,
                    total_rx = self.stats.total_bytes_received,
                    "Received packet"
                );
                for observer in &mut self.observers {
                    observer.on_packet_received(now, &frame, from, local);
                }
            }
            Err(e) => {
                self.stats.malformed_received += 1;
                metrics::record_malformed_frame(role);
                debug!(
                    role,
                    node = self.node_id,
                    %from,
                    bytes = datagram.len(),
                    error = %e,
                    "Received datagram without a valid stream header"
                );
            }
        }
    }

    /// Server handling of one request from `from`.
    fn on_request(&mut self, from: Endpoint, scheduler: &mut dyn Scheduler) {
        if !self.connected || self.peer != Some(from) {
            let previous = self.peer.replace(from);
            if let RoleState::Server(server) = &mut self.role {
                server.connect_attempts += 1;
            }
            metrics::record_peer_switch();
            info!(
                node = self.node_id,
                peer = %from,
                previous = ?previous,
                at = %scheduler.now(),
                "Streaming to new peer"
            );

            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            match transport.connect(from) {
                Ok(()) => {
                    self.connected = true;
                    self.schedule_next_tx(scheduler);
                }
                Err(e) => {
                    self.connected = false;
                    metrics::record_transport_error(self.config.role.as_str(), e.kind());
                    warn!(node = self.node_id, peer = %from, error = %e, "Failed to connect to peer");
                }
            }
        } else {
            // Same peer: resumes a paused stream, no-op while one is pending
            self.schedule_next_tx(scheduler);
        }

        // The byte budget may have stopped the session
        if self.state == SessionState::Terminated {
            return;
        }
        self.rearm_liveness(scheduler);
    }

    fn rearm_liveness(&mut self, scheduler: &mut dyn Scheduler) {
        let window = self.config.request_interval.saturating_mul(2);
        let RoleState::Server(server) = &mut self.role else {
            return;
        };
        if let Some(previous) = server.liveness_timer.take() {
            scheduler.cancel(previous);
        }
        server.liveness_timer = Some(scheduler.schedule_after(window, TimerKind::Liveness));
    }
}
