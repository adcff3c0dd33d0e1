//! In-memory datagram network.
//!
//! Every node is identified by an IP address. Sockets bind `(node ip, port)`
//! and a datagram sent at `t` is queued on the destination socket at
//! `t + link_delay`. Datagrams to an unbound address are dropped.

use super::{AppId, Event, SimCore};
use crate::errors::TransportError;
use crate::runtime::{Endpoint, Transport};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

pub(crate) type SocketId = usize;

const EPHEMERAL_PORT_START: u16 = 49_153;

#[derive(Debug)]
struct SocketState {
    node_ip: IpAddr,
    app: AppId,
    local: Option<Endpoint>,
    peer: Option<Endpoint>,
    inbox: VecDeque<(Bytes, Endpoint)>,
    closed: bool,
}

/// Socket table and address bindings.
#[derive(Debug)]
pub(crate) struct Network {
    link_delay: Duration,
    sockets: Vec<SocketState>,
    bindings: HashMap<Endpoint, SocketId>,
    next_ephemeral: u16,
    dropped: u64,
}

impl Network {
    pub(crate) fn new(link_delay: Duration) -> Self {
        Self {
            link_delay,
            sockets: Vec::new(),
            bindings: HashMap::new(),
            next_ephemeral: EPHEMERAL_PORT_START,
            dropped: 0,
        }
    }

    pub(crate) fn link_delay(&self) -> Duration {
        self.link_delay
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn open(&mut self, node_ip: IpAddr, app: AppId) -> SocketId {
        self.sockets.push(SocketState {
            node_ip,
            app,
            local: None,
            peer: None,
            inbox: VecDeque::new(),
            closed: false,
        });
        self.sockets.len() - 1
    }

    fn socket(&self, id: SocketId) -> Result<&SocketState, TransportError> {
        match self.sockets.get(id) {
            Some(socket) if !socket.closed => Ok(socket),
            _ => Err(TransportError::Closed),
        }
    }

    fn socket_mut(&mut self, id: SocketId) -> Result<&mut SocketState, TransportError> {
        match self.sockets.get_mut(id) {
            Some(socket) if !socket.closed => Ok(socket),
            _ => Err(TransportError::Closed),
        }
    }

    fn bind(&mut self, id: SocketId, requested: Endpoint) -> Result<Endpoint, TransportError> {
        let node_ip = self.socket(id)?.node_ip;
        let ip = if requested.ip().is_unspecified() {
            node_ip
        } else {
            requested.ip()
        };

        let local = if requested.port() == 0 {
            self.ephemeral(ip)?
        } else {
            let addr = SocketAddr::new(ip, requested.port());
            if self.bindings.contains_key(&addr) {
                return Err(TransportError::AddrInUse(addr));
            }
            addr
        };

        let previous = self.socket_mut(id)?.local.replace(local);
        if let Some(previous) = previous {
            self.bindings.remove(&previous);
        }
        self.bindings.insert(local, id);
        Ok(local)
    }

    fn ephemeral(&mut self, ip: IpAddr) -> Result<Endpoint, TransportError> {
        let span = u16::MAX - EPHEMERAL_PORT_START;
        for _ in 0..=span {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == u16::MAX {
                EPHEMERAL_PORT_START
            } else {
                port + 1
            };
            let addr = SocketAddr::new(ip, port);
            if !self.bindings.contains_key(&addr) {
                return Ok(addr);
            }
        }
        Err(TransportError::AddrInUse(SocketAddr::new(ip, 0)))
    }

    fn connect(&mut self, id: SocketId, peer: Endpoint) -> Result<(), TransportError> {
        let socket = self.socket_mut(id)?;
        if socket.local.is_none() {
            return Err(TransportError::NotBound);
        }
        socket.peer = Some(peer);
        Ok(())
    }

    /// Source and destination of a send from `id`.
    fn route(&self, id: SocketId) -> Result<(Endpoint, Endpoint), TransportError> {
        let socket = self.socket(id)?;
        let local = socket.local.ok_or(TransportError::NotBound)?;
        let peer = socket.peer.ok_or(TransportError::NotConnected)?;
        Ok((local, peer))
    }

    fn recv(&mut self, id: SocketId) -> Option<(Bytes, Endpoint)> {
        self.socket_mut(id).ok()?.inbox.pop_front()
    }

    fn close(&mut self, id: SocketId) {
        if let Some(socket) = self.sockets.get_mut(id) {
            socket.closed = true;
            socket.inbox.clear();
            if let Some(local) = socket.local.take() {
                self.bindings.remove(&local);
            }
        }
    }

    /// Queue `datagram` on the socket bound to `to`. Returns the owning
    /// application, or `None` if nothing is bound there.
    pub(crate) fn deliver(&mut self, to: Endpoint, from: Endpoint, datagram: Bytes) -> Option<AppId> {
        let Some(socket) = self
            .bindings
            .get(&to)
            .and_then(|&id| self.sockets.get_mut(id))
        else {
            self.dropped += 1;
            trace!(%to, %from, "Dropping datagram to unbound address");
            return None;
        };
        socket.inbox.push_back((datagram, from));
        Some(socket.app)
    }

    fn local(&self, id: SocketId) -> Option<Endpoint> {
        self.socket(id).ok()?.local
    }

    fn peer(&self, id: SocketId) -> Option<Endpoint> {
        self.socket(id).ok()?.peer
    }
}

/// A [`Transport`] handle onto the simulated network.
#[derive(Debug)]
pub struct SimSocket {
    core: Rc<RefCell<SimCore>>,
    id: SocketId,
}

impl SimSocket {
    pub(crate) fn new(core: Rc<RefCell<SimCore>>, id: SocketId) -> Self {
        Self { core, id }
    }
}

impl Transport for SimSocket {
    fn bind(&mut self, local: Endpoint) -> Result<Endpoint, TransportError> {
        self.core.borrow_mut().network.bind(self.id, local)
    }

    fn connect(&mut self, peer: Endpoint) -> Result<(), TransportError> {
        self.core.borrow_mut().network.connect(self.id, peer)
    }

    fn send(&mut self, datagram: Bytes) -> Result<usize, TransportError> {
        let mut core = self.core.borrow_mut();
        let (from, to) = core.network.route(self.id)?;
        let at = core.now + core.network.link_delay();
        let len = datagram.len();
        core.push(at, Event::Deliver { to, from, datagram });
        Ok(len)
    }

    fn recv_from(&mut self) -> Option<(Bytes, Endpoint)> {
        self.core.borrow_mut().network.recv(self.id)
    }

    fn local_addr(&self) -> Option<Endpoint> {
        self.core.borrow().network.local(self.id)
    }

    fn peer_addr(&self) -> Option<Endpoint> {
        self.core.borrow().network.peer(self.id)
    }

    fn close(&mut self) {
        self.core.borrow_mut().network.close(self.id);
    }
}
