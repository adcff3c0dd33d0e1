//! Recording transport mock.
//!
//! Clones share state, so a test keeps one clone to inspect what the
//! session sent and to queue inbound datagrams, and hands the other to the
//! session.

use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use streaming_app::errors::TransportError;
use streaming_app::runtime::{Endpoint, Transport};

/// Port handed out for binds to port 0.
pub const MOCK_EPHEMERAL_PORT: u16 = 49_153;

/// Mock transport that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Rc<RefCell<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    local: Option<Endpoint>,
    peer: Option<Endpoint>,
    /// Every endpoint passed to `connect`, in order.
    connects: Vec<Endpoint>,
    /// Every datagram accepted by `send`, with its destination.
    sent: Vec<(Bytes, Endpoint)>,
    inbox: VecDeque<(Bytes, Endpoint)>,
    bind_error: Option<TransportError>,
    connect_error: Option<TransportError>,
    send_error: Option<TransportError>,
    closed: bool,
    close_calls: u32,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `bind` with `error`.
    #[must_use]
    pub fn with_bind_error(self, error: TransportError) -> Self {
        self.inner.borrow_mut().bind_error = Some(error);
        self
    }

    /// Fail every `connect` with `error`.
    #[must_use]
    pub fn with_connect_error(self, error: TransportError) -> Self {
        self.inner.borrow_mut().connect_error = Some(error);
        self
    }

    /// Fail every `send` with `error`.
    #[must_use]
    pub fn with_send_error(self, error: TransportError) -> Self {
        self.inner.borrow_mut().send_error = Some(error);
        self
    }

    /// Pretend an already bound handle connected to `peer`.
    #[must_use]
    pub fn with_peer(self, peer: Endpoint) -> Self {
        self.inner.borrow_mut().peer = Some(peer);
        self
    }

    /// Stop failing sends.
    pub fn clear_send_error(&self) {
        self.inner.borrow_mut().send_error = None;
    }

    /// Queue a datagram for the next `recv_from`.
    pub fn push_inbound(&self, datagram: Bytes, from: Endpoint) {
        self.inner.borrow_mut().inbox.push_back((datagram, from));
    }

    /// Datagrams still queued.
    #[must_use]
    pub fn inbound_len(&self) -> usize {
        self.inner.borrow().inbox.len()
    }

    /// Everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(Bytes, Endpoint)> {
        self.inner.borrow().sent.clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.inner.borrow().sent.len()
    }

    /// Endpoints passed to `connect`, in call order.
    #[must_use]
    pub fn connects(&self) -> Vec<Endpoint> {
        self.inner.borrow().connects.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    #[must_use]
    pub fn close_calls(&self) -> u32 {
        self.inner.borrow().close_calls
    }
}

impl Transport for MockTransport {
    fn bind(&mut self, local: Endpoint) -> Result<Endpoint, TransportError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(error) = inner.bind_error.clone() {
            return Err(error);
        }
        let bound = if local.port() == 0 {
            SocketAddr::new(local.ip(), MOCK_EPHEMERAL_PORT)
        } else {
            local
        };
        inner.local = Some(bound);
        Ok(bound)
    }

    fn connect(&mut self, peer: Endpoint) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        inner.connects.push(peer);
        if let Some(error) = inner.connect_error.clone() {
            return Err(error);
        }
        inner.peer = Some(peer);
        Ok(())
    }

    fn send(&mut self, datagram: Bytes) -> Result<usize, TransportError> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if let Some(error) = inner.send_error.clone() {
            return Err(error);
        }
        let peer = inner.peer.ok_or(TransportError::NotConnected)?;
        let len = datagram.len();
        inner.sent.push((datagram, peer));
        Ok(len)
    }

    fn recv_from(&mut self) -> Option<(Bytes, Endpoint)> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return None;
        }
        inner.inbox.pop_front()
    }

    fn local_addr(&self) -> Option<Endpoint> {
        self.inner.borrow().local
    }

    fn peer_addr(&self) -> Option<Endpoint> {
        self.inner.borrow().peer
    }

    fn close(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        inner.close_calls += 1;
    }
}
