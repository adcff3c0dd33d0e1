//! Discrete-event harness for driving streaming sessions.
//!
//! [`Simulation`] owns a virtual clock, a time-ordered event queue and an
//! in-memory datagram network. Sessions added to it get a [`SimSocket`]
//! transport and a [`Scheduler`] view onto the shared queue. Events at the
//! same instant run in the order they were scheduled.
//!
//! ```text
//! let mut sim = Simulation::new(Duration::from_millis(10));
//! let server = sim.add_session(server_ip, server_config);
//! let client = sim.add_session(client_ip, client_config);
//! sim.start_at(server, SimTime::from_millis(100));
//! sim.start_at(client, SimTime::from_millis(1_900));
//! sim.run_until(SimTime::from_millis(10_000))?;
//! ```

mod network;
mod probe;

pub use network::SimSocket;
pub use probe::{ThroughputProbe, ThroughputSample};

use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::runtime::{Endpoint, Scheduler, SimTime, TimerHandle, TimerKind};
use crate::session::{SessionObserver, StreamingSession};
use bytes::Bytes;
use network::Network;
use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::net::IpAddr;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Index of a session within a [`Simulation`].
pub type AppId = usize;

/// Index of a probe within a [`Simulation`].
pub type ProbeId = usize;

#[derive(Debug)]
pub(crate) enum Event {
    Timer {
        app: AppId,
        handle: TimerHandle,
        kind: TimerKind,
    },
    Deliver {
        to: Endpoint,
        from: Endpoint,
        datagram: Bytes,
    },
    Start(AppId),
    Stop(AppId),
    StopSending(AppId),
    Probe(ProbeId),
}

#[derive(Debug)]
struct QueuedEvent {
    at: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Clock, queue and network shared by the harness, schedulers and sockets.
#[derive(Debug)]
pub(crate) struct SimCore {
    pub(crate) now: SimTime,
    next_seq: u64,
    next_timer: u64,
    queue: BinaryHeap<Reverse<QueuedEvent>>,
    live_timers: HashSet<TimerHandle>,
    pub(crate) network: Network,
}

impl SimCore {
    fn new(link_delay: Duration) -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            next_timer: 0,
            queue: BinaryHeap::new(),
            live_timers: HashSet::new(),
            network: Network::new(link_delay),
        }
    }

    pub(crate) fn push(&mut self, at: SimTime, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(QueuedEvent { at, seq, event }));
    }

    /// Pop the next event due at or before `end`, advancing the clock.
    fn pop_due(&mut self, end: SimTime) -> Option<Event> {
        match self.queue.peek() {
            Some(Reverse(next)) if next.at <= end => {}
            _ => return None,
        }
        let Reverse(next) = self.queue.pop()?;
        self.now = next.at;
        Some(next.event)
    }
}

/// [`Scheduler`] handed to one session's callbacks.
#[derive(Debug, Clone)]
pub struct SimScheduler {
    core: Rc<RefCell<SimCore>>,
    app: AppId,
}

impl Scheduler for SimScheduler {
    fn now(&self) -> SimTime {
        self.core.borrow().now
    }

    fn schedule_after(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let mut core = self.core.borrow_mut();
        let handle = TimerHandle(core.next_timer);
        core.next_timer += 1;
        core.live_timers.insert(handle);
        let at = core.now + delay;
        core.push(
            at,
            Event::Timer {
                app: self.app,
                handle,
                kind,
            },
        );
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.core.borrow_mut().live_timers.remove(&handle);
    }
}

/// Single-threaded event loop driving a set of streaming sessions.
pub struct Simulation {
    core: Rc<RefCell<SimCore>>,
    apps: Vec<StreamingSession<SimSocket>>,
    probes: Vec<ThroughputProbe>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now())
            .field("apps", &self.apps)
            .field("probes", &self.probes.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Empty simulation with a uniform one-way `link_delay` between nodes.
    #[must_use]
    pub fn new(link_delay: Duration) -> Self {
        Self {
            core: Rc::new(RefCell::new(SimCore::new(link_delay))),
            apps: Vec::new(),
            probes: Vec::new(),
        }
    }

    #[must_use]
    pub fn now(&self) -> SimTime {
        self.core.borrow().now
    }

    /// Datagrams dropped because nothing was bound at their destination.
    #[must_use]
    pub fn dropped_datagrams(&self) -> u64 {
        self.core.borrow().network.dropped()
    }

    /// Install a session on the node with address `node_ip`.
    pub fn add_session(&mut self, node_ip: IpAddr, config: SessionConfig) -> AppId {
        let app = self.apps.len();
        let socket_id = self.core.borrow_mut().network.open(node_ip, app);
        let socket = SimSocket::new(Rc::clone(&self.core), socket_id);
        let node_id = u32::try_from(app).unwrap_or(u32::MAX);
        debug!(app, %node_ip, role = %config.role, "Adding session");
        self.apps.push(StreamingSession::new(config, node_id, socket));
        app
    }

    pub fn add_observer(&mut self, app: AppId, observer: Box<dyn SessionObserver>) {
        match self.apps.get_mut(app) {
            Some(session) => session.add_observer(observer),
            None => warn!(app, "Observer for unknown session"),
        }
    }

    #[must_use]
    pub fn session(&self, app: AppId) -> Option<&StreamingSession<SimSocket>> {
        self.apps.get(app)
    }

    pub fn session_mut(&mut self, app: AppId) -> Option<&mut StreamingSession<SimSocket>> {
        self.apps.get_mut(app)
    }

    pub fn start_at(&mut self, app: AppId, at: SimTime) {
        self.core.borrow_mut().push(at, Event::Start(app));
    }

    pub fn stop_at(&mut self, app: AppId, at: SimTime) {
        self.core.borrow_mut().push(at, Event::Stop(app));
    }

    pub fn stop_sending_at(&mut self, app: AppId, at: SimTime) {
        self.core.borrow_mut().push(at, Event::StopSending(app));
    }

    /// Sample `app` every `interval`, starting one interval from now.
    pub fn add_probe(&mut self, app: AppId, interval: Duration) -> ProbeId {
        let id = self.probes.len();
        self.probes.push(ThroughputProbe::new(app, interval));
        let mut core = self.core.borrow_mut();
        let at = core.now + interval;
        core.push(at, Event::Probe(id));
        id
    }

    #[must_use]
    pub fn probe(&self, id: ProbeId) -> Option<&ThroughputProbe> {
        self.probes.get(id)
    }

    /// Put a datagram on the wire at `at`, bypassing any socket. It arrives
    /// `link_delay` later like any other.
    pub fn inject_datagram(&mut self, at: SimTime, from: Endpoint, to: Endpoint, datagram: Bytes) {
        let mut core = self.core.borrow_mut();
        let arrival = at + core.network.link_delay();
        core.push(arrival, Event::Deliver { to, from, datagram });
    }

    /// Run `f` against a session with its scheduler, at the current time.
    pub fn with_scheduler<R>(
        &mut self,
        app: AppId,
        f: impl FnOnce(&mut StreamingSession<SimSocket>, &mut dyn Scheduler) -> R,
    ) -> Option<R> {
        let mut scheduler = self.scheduler(app);
        let session = self.apps.get_mut(app)?;
        Some(f(session, &mut scheduler))
    }

    fn scheduler(&self, app: AppId) -> SimScheduler {
        SimScheduler {
            core: Rc::clone(&self.core),
            app,
        }
    }

    /// Process every event due at or before `end`, then advance the clock
    /// to `end`.
    ///
    /// # Errors
    ///
    /// Stops at the first session that fails to start.
    pub fn run_until(&mut self, end: SimTime) -> Result<(), SessionError> {
        loop {
            let next = self.core.borrow_mut().pop_due(end);
            let Some(event) = next else {
                break;
            };
            self.dispatch(event)?;
        }
        let mut core = self.core.borrow_mut();
        if core.now < end {
            core.now = end;
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SessionError> {
        match event {
            Event::Timer { app, handle, kind } => {
                if !self.core.borrow_mut().live_timers.remove(&handle) {
                    trace!(app, ?handle, kind = kind.as_str(), "Skipping cancelled timer");
                    return Ok(());
                }
                let mut scheduler = self.scheduler(app);
                if let Some(session) = self.apps.get_mut(app) {
                    session.handle_timer(kind, handle, &mut scheduler);
                }
            }
            Event::Deliver { to, from, datagram } => {
                let target = self.core.borrow_mut().network.deliver(to, from, datagram);
                if let Some(app) = target {
                    let mut scheduler = self.scheduler(app);
                    if let Some(session) = self.apps.get_mut(app) {
                        session.on_data_available(&mut scheduler);
                    }
                }
            }
            Event::Start(app) => {
                let mut scheduler = self.scheduler(app);
                if let Some(session) = self.apps.get_mut(app) {
                    session.start(&mut scheduler)?;
                }
            }
            Event::Stop(app) => {
                let mut scheduler = self.scheduler(app);
                if let Some(session) = self.apps.get_mut(app) {
                    session.stop(&mut scheduler);
                }
            }
            Event::StopSending(app) => {
                let mut scheduler = self.scheduler(app);
                if let Some(session) = self.apps.get_mut(app) {
                    session.stop_sending(&mut scheduler);
                }
            }
            Event::Probe(id) => {
                let now = self.now();
                let Some(probe) = self.probes.get_mut(id) else {
                    return Ok(());
                };
                if let Some(session) = self.apps.get_mut(probe.app()) {
                    probe.sample(now, session);
                }
                let next = now + probe.interval();
                self.core.borrow_mut().push(next, Event::Probe(id));
            }
        }
        Ok(())
    }
}
