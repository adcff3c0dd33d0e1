//! Streaming session state machine.
//!
//! One [`StreamingSession`] runs per application, in one of two roles:
//!
//! - **Client**: connects to the configured server on start, sends a
//!   request frame every `request_interval` and records what comes back.
//! - **Server**: binds a fixed port and waits. The first request (or a
//!   request from a different endpoint) rebinds the stream to that sender
//!   and starts CBR emission at `data_rate`. Every request pushes a
//!   liveness deadline `2 * request_interval` out; if it passes, emission
//!   pauses and the partially elapsed interval is banked (see [`pacing`]).
//!
//! ```text
//! Idle --start()--> Active
//! Active --stop_sending() / liveness timeout--> Paused
//! Paused --request (server)--> Active
//! Active/Paused --stop()--> Terminated
//! ```
//!
//! The server follows whichever endpoint sent the latest request. There is
//! no authentication: a single frame from another address redirects the
//! whole stream.
//!
//! All methods take the driver's [`Scheduler`]; the session owns at most
//! one pending send timer and (server) one liveness timer at any time.

mod pacing;
mod receive;

pub mod observer;
pub mod stats;

pub use observer::{RecordingObserver, SessionObserver, TraceDirection, TraceEvent};
pub use stats::SessionStats;

use crate::config::{Role, SessionConfig};
use crate::errors::{SessionError, TransportError};
use crate::observability::metrics;
use crate::rate::DataRate;
use crate::runtime::{Endpoint, Scheduler, SimTime, TimerHandle, TimerKind, Transport};
use pacing::Pacer;
use std::fmt;
use std::time::Duration;
use stream_protocol::{encode_frame, StreamFrame};
use tracing::{debug, error, info, instrument, trace, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not started.
    Idle,
    /// Started; emitting, or (server) listening for a request.
    Active,
    /// Emission paused by `stop_sending` or a liveness timeout.
    Paused,
    /// Stopped. Terminal.
    Terminated,
}

/// Role-specific state.
enum RoleState<T> {
    Client,
    Server(ServerState<T>),
}

/// State only a server carries.
struct ServerState<T> {
    liveness_timer: Option<TimerHandle>,
    /// Handles accepted by a connection-oriented transport.
    accepted: Vec<T>,
    connect_attempts: u64,
}

impl<T> ServerState<T> {
    fn new() -> Self {
        Self {
            liveness_timer: None,
            accepted: Vec::new(),
            connect_attempts: 0,
        }
    }
}

/// A client or server streaming application bound to one transport.
pub struct StreamingSession<T: Transport> {
    config: SessionConfig,
    node_id: u32,
    transport: Option<T>,
    role: RoleState<T>,
    peer: Option<Endpoint>,
    local: Option<Endpoint>,
    connected: bool,
    send_enabled: bool,
    state: SessionState,
    pacer: Pacer,
    stats: SessionStats,
    stop_calls: u64,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl<T: Transport> fmt::Debug for StreamingSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("role", &self.config.role)
            .field("node_id", &self.node_id)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .field("local", &self.local)
            .field("connected", &self.connected)
            .field("send_enabled", &self.send_enabled)
            .field("stats", &self.stats)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> StreamingSession<T> {
    /// Create an idle session. Configuration is validated by [`Self::start`].
    #[must_use]
    pub fn new(config: SessionConfig, node_id: u32, transport: T) -> Self {
        let role = match config.role {
            Role::Client => RoleState::Client,
            Role::Server => RoleState::Server(ServerState::new()),
        };
        let peer = match config.role {
            Role::Client => config.remote,
            Role::Server => None,
        };
        Self {
            config,
            node_id,
            transport: Some(transport),
            role,
            peer,
            local: None,
            connected: false,
            send_enabled: true,
            state: SessionState::Idle,
            pacer: Pacer::default(),
            stats: SessionStats::default(),
            stop_calls: 0,
            observers: Vec::new(),
        }
    }

    /// Register a packet trace observer.
    pub fn add_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.config.role
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current destination of outgoing packets.
    #[must_use]
    pub fn peer(&self) -> Option<Endpoint> {
        self.peer
    }

    /// Address bound at start.
    #[must_use]
    pub fn local_addr(&self) -> Option<Endpoint> {
        self.local
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub fn is_send_enabled(&self) -> bool {
        self.send_enabled
    }

    /// Whether a send timer is outstanding.
    #[must_use]
    pub fn is_send_pending(&self) -> bool {
        self.pacer.is_pending()
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    #[must_use]
    pub fn total_bytes_received(&self) -> u64 {
        self.stats.total_bytes_received
    }

    #[must_use]
    pub fn total_packets_received(&self) -> u64 {
        self.stats.packets_received
    }

    #[must_use]
    pub fn total_bytes_sent(&self) -> u64 {
        self.stats.total_bytes_sent
    }

    #[must_use]
    pub fn packets_sent(&self) -> u64 {
        self.stats.packets_sent
    }

    /// One-way delay summed over packets received since the previous call.
    ///
    /// Reading resets the sum to zero. Divide by the packet-count delta over
    /// the same interval for a mean.
    pub fn total_delay_since_last_read(&mut self) -> Duration {
        self.stats.take_delay()
    }

    /// Delay summed since the last reset, without resetting it.
    #[must_use]
    pub fn peek_total_delay(&self) -> Duration {
        self.stats.peek_delay()
    }

    /// Reset the delay sum without reading it.
    pub fn reset_total_delay(&mut self) {
        let _ = self.stats.take_delay();
    }

    /// Bits banked from interrupted pacing intervals.
    #[must_use]
    pub fn residual_bits(&self) -> u64 {
        self.pacer.residual_bits()
    }

    /// Time the last packet was handed to the transport.
    #[must_use]
    pub fn last_packet_time(&self) -> SimTime {
        self.pacer.last_packet_time()
    }

    /// Number of times [`Self::stop`] has been invoked.
    #[must_use]
    pub fn stop_calls(&self) -> u64 {
        self.stop_calls
    }

    /// Server connect attempts, one per newly bound peer. Zero for a client.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        match &self.role {
            RoleState::Server(server) => server.connect_attempts,
            RoleState::Client => 0,
        }
    }

    /// Accepted peer handles still held by a server.
    #[must_use]
    pub fn accepted_peers(&self) -> usize {
        match &self.role {
            RoleState::Server(server) => server.accepted.len(),
            RoleState::Client => 0,
        }
    }

    /// Whether a server liveness deadline is outstanding.
    #[must_use]
    pub fn is_liveness_pending(&self) -> bool {
        match &self.role {
            RoleState::Server(server) => server.liveness_timer.is_some(),
            RoleState::Client => false,
        }
    }

    #[must_use]
    pub fn data_rate(&self) -> DataRate {
        self.config.data_rate
    }

    /// Change the emission rate.
    ///
    /// An already pending send keeps the delay it was armed with, and
    /// cancelling it banks no residual bits. A server at a zero rate pauses
    /// at its next scheduling decision.
    pub fn set_target_rate(&mut self, rate: DataRate) {
        debug!(
            role = %self.config.role,
            node = self.node_id,
            old = %self.config.data_rate,
            new = %rate,
            "Data rate changed"
        );
        self.config.data_rate = rate;
    }

    /// Bind the transport and begin the role's behavior.
    ///
    /// A client connects to its server and sends its first request
    /// immediately. A server only listens. Starting a session that is not
    /// idle does nothing.
    ///
    /// # Errors
    ///
    /// `SessionError::Config` for an invalid configuration (e.g. a server
    /// without a fixed port) and `SessionError::Transport` if the bind
    /// fails. Both are fatal for the scenario.
    #[instrument(skip_all, fields(role = %self.config.role, node = self.node_id))]
    pub fn start(&mut self, scheduler: &mut dyn Scheduler) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            debug!(state = ?self.state, "Session already started");
            return Ok(());
        }
        self.config.validate()?;

        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::Closed)?;
        let local = transport.bind(self.config.local).map_err(|e| {
            error!(local = %self.config.local, error = %e, "Failed to bind transport");
            e
        })?;
        self.local = Some(local);
        self.state = SessionState::Active;

        if self.config.local.port() == 0 {
            info!(%local, "Bound transport to ephemeral port");
        } else {
            info!(%local, "Bound transport to local port");
        }

        match self.config.role {
            Role::Client => {
                let Some(remote) = self.peer else {
                    return Ok(());
                };
                match transport.connect(remote) {
                    Ok(()) => {
                        self.connected = true;
                        info!(
                            peer = %remote,
                            at = %scheduler.now(),
                            "Connected to server, sending first request"
                        );
                        self.send_packet(scheduler);
                    }
                    Err(e) => {
                        warn!(peer = %remote, error = %e, "Failed to connect to server");
                        metrics::record_transport_error(self.config.role.as_str(), e.kind());
                    }
                }
            }
            Role::Server => {
                debug!("Listening for stream requests");
            }
        }
        Ok(())
    }

    /// Cancel all timers and close the transport and any accepted handles.
    ///
    /// Safe to call repeatedly; later calls only log that there is no
    /// transport left to close.
    #[instrument(skip_all, fields(role = %self.config.role, node = self.node_id))]
    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) {
        self.stop_calls += 1;
        self.cancel_pending_send(scheduler);

        if let RoleState::Server(server) = &mut self.role {
            if let Some(handle) = server.liveness_timer.take() {
                scheduler.cancel(handle);
            }
            for mut accepted in server.accepted.drain(..) {
                accepted.close();
            }
        }

        match self.transport.take() {
            Some(mut transport) => {
                transport.close();
                info!(
                    at = %scheduler.now(),
                    packets_sent = self.stats.packets_sent,
                    bytes_sent = self.stats.total_bytes_sent,
                    bytes_received = self.stats.total_bytes_received,
                    "Session stopped"
                );
            }
            None => warn!("Found no transport to close on stop"),
        }

        self.connected = false;
        self.state = SessionState::Terminated;
    }

    /// Disable further transmissions without closing the transport.
    pub fn stop_sending(&mut self, scheduler: &mut dyn Scheduler) {
        debug!(role = %self.config.role, node = self.node_id, "Sending disabled");
        self.send_enabled = false;
        self.cancel_pending_send(scheduler);
    }

    /// Cancel the pending send timer, banking bits from the elapsed part of
    /// the interval when the rate has not changed since it was armed.
    pub fn cancel_pending_send(&mut self, scheduler: &mut dyn Scheduler) {
        let now = scheduler.now();
        if let Some(handle) =
            self.pacer
                .cancel(now, self.config.data_rate, self.config.packet_bits())
        {
            scheduler.cancel(handle);
            debug!(
                role = %self.config.role,
                node = self.node_id,
                residual_bits = self.pacer.residual_bits(),
                "Cancelled pending send"
            );
        }
        if self.state == SessionState::Active {
            self.state = SessionState::Paused;
        }
    }

    /// Dispatch a fired timer.
    pub fn handle_timer(
        &mut self,
        kind: TimerKind,
        handle: TimerHandle,
        scheduler: &mut dyn Scheduler,
    ) {
        match kind {
            TimerKind::Send => {
                if self.pacer.take_fired(handle) {
                    self.send_packet(scheduler);
                } else {
                    trace!(?handle, "Ignoring stale send timer");
                }
            }
            TimerKind::Liveness => {
                let expired = match &mut self.role {
                    RoleState::Server(server) if server.liveness_timer == Some(handle) => {
                        server.liveness_timer = None;
                        true
                    }
                    _ => false,
                };
                if expired {
                    info!(
                        node = self.node_id,
                        peer = ?self.peer,
                        at = %scheduler.now(),
                        "No request within liveness window, pausing stream"
                    );
                    metrics::record_liveness_timeout();
                    self.cancel_pending_send(scheduler);
                } else {
                    trace!(?handle, "Ignoring stale liveness timer");
                }
            }
        }
    }

    /// Arm the pacing timer for the next packet, unless one is pending,
    /// sending is disabled, or the byte budget is spent (which stops the
    /// session).
    pub fn schedule_next_tx(&mut self, scheduler: &mut dyn Scheduler) {
        if self.pacer.is_pending() {
            return;
        }
        if !self.send_enabled || matches!(self.state, SessionState::Idle | SessionState::Terminated)
        {
            return;
        }
        if self.stats.budget_exhausted(self.config.max_bytes) {
            info!(
                role = %self.config.role,
                node = self.node_id,
                total_bytes_sent = self.stats.total_bytes_sent,
                max_bytes = self.config.max_bytes,
                "Byte budget exhausted"
            );
            self.stop(scheduler);
            return;
        }

        let delay = match self.role {
            RoleState::Server(_) => {
                let Some(delay) = self
                    .pacer
                    .rate_delay(self.config.packet_bits(), self.config.data_rate)
                else {
                    warn!(node = self.node_id, "Zero data rate, pausing");
                    if self.state == SessionState::Active {
                        self.state = SessionState::Paused;
                    }
                    return;
                };
                delay
            }
            RoleState::Client => self.config.request_interval,
        };

        let now = scheduler.now();
        let handle = scheduler.schedule_after(delay, TimerKind::Send);
        self.pacer.arm(handle, self.config.data_rate, now);
        self.state = SessionState::Active;
        debug!(
            role = %self.config.role,
            node = self.node_id,
            at = %now,
            delay_ns = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX),
            residual_bits = self.pacer.residual_bits(),
            "Scheduled next transmission"
        );
    }

    /// Build and transmit one frame, then arm the next transmission.
    fn send_packet(&mut self, scheduler: &mut dyn Scheduler) {
        if !self.send_enabled || self.state == SessionState::Terminated {
            return;
        }
        if self.pacer.is_pending() {
            warn!(node = self.node_id, "Send requested while a send timer is pending");
            return;
        }
        let Some(peer) = self.peer else {
            warn!(node = self.node_id, "Send requested without a peer");
            return;
        };
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let now = scheduler.now();
        let role = self.config.role.as_str();
        let frame = StreamFrame::new(
            self.stats.packets_sent,
            self.node_id,
            now.as_nanos(),
            peer,
            self.config.packet_size,
        );

        match encode_frame(&frame) {
            Ok(datagram) => match transport.send(datagram) {
                Ok(bytes) => {
                    self.stats.record_sent(bytes);
                    metrics::record_packet_sent(role, bytes);
                    let local = transport.local_addr();
                    for observer in &mut self.observers {
                        observer.on_packet_sent(now, &frame, local, peer);
                    }
                    trace!(
                        role,
                        node = self.node_id,
                        seq = frame.sequence,
                        bytes,
                        %peer,
                        total_tx = self.stats.total_bytes_sent,
                        "Sent packet"
                    );
                }
                Err(e) => {
                    self.stats.send_failures += 1;
                    metrics::record_transport_error(role, e.kind());
                    warn!(role, node = self.node_id, %peer, error = %e, "Send failed");
                }
            },
            Err(e) => {
                error!(role, node = self.node_id, error = %e, "Failed to encode frame");
            }
        }

        self.pacer.record_sent(now);
        self.schedule_next_tx(scheduler);
    }

    /// The transport finished a connect it reported as in progress.
    pub fn on_connect_succeeded(&mut self, scheduler: &mut dyn Scheduler) {
        info!(
            role = %self.config.role,
            node = self.node_id,
            peer = ?self.peer,
            at = %scheduler.now(),
            "Connection succeeded"
        );
        self.connected = true;
        if matches!(self.role, RoleState::Server(_)) {
            self.schedule_next_tx(scheduler);
        }
    }

    /// The transport could not reach the peer. No retry is attempted.
    pub fn on_connect_failed(&mut self) {
        warn!(
            role = %self.config.role,
            node = self.node_id,
            peer = ?self.peer,
            "Connection failed"
        );
        self.connected = false;
        metrics::record_transport_error(self.config.role.as_str(), "connection_refused");
    }

    /// A connection-oriented transport accepted a new peer handle.
    pub fn on_peer_accepted(&mut self, mut handle: T) {
        match &mut self.role {
            RoleState::Server(server) => {
                debug!(
                    node = self.node_id,
                    peer = ?handle.peer_addr(),
                    "Accepted peer connection"
                );
                server.accepted.push(handle);
            }
            RoleState::Client => {
                warn!(node = self.node_id, "Client does not accept connections, closing");
                handle.close();
            }
        }
    }

    /// An accepted peer closed its side.
    pub fn on_peer_closed(&mut self, peer: Endpoint) {
        if let RoleState::Server(server) = &mut self.role {
            let (closed, open): (Vec<T>, Vec<T>) = server
                .accepted
                .drain(..)
                .partition(|handle| handle.peer_addr() == Some(peer));
            server.accepted = open;
            let released = closed.len();
            for mut handle in closed {
                handle.close();
            }
            debug!(node = self.node_id, %peer, released, "Peer closed connection");
        }
    }
}
