//! Streaming session error types.
//!
//! Only configuration errors and a failed bind at start are surfaced to the
//! caller. Transport failures after start are logged and counted; the
//! session never retries on its own.

use crate::config::ConfigError;
use crate::runtime::Endpoint;
use thiserror::Error;

/// Streaming session error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid session or scenario configuration. Fatal at start.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failures reported by a [`Transport`](crate::runtime::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Another handle already holds this address.
    #[error("Address already in use: {0}")]
    AddrInUse(Endpoint),

    /// Operation requires a bound handle.
    #[error("Transport is not bound")]
    NotBound,

    /// Send without a connected peer.
    #[error("Transport is not connected")]
    NotConnected,

    /// Handle was closed.
    #[error("Transport is closed")]
    Closed,

    /// Peer refused or could not be reached.
    #[error("Connection to {0} refused")]
    ConnectionRefused(Endpoint),
}

impl TransportError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            TransportError::AddrInUse(_) => "addr_in_use",
            TransportError::NotBound => "not_bound",
            TransportError::NotConnected => "not_connected",
            TransportError::Closed => "closed",
            TransportError::ConnectionRefused(_) => "connection_refused",
        }
    }
}
