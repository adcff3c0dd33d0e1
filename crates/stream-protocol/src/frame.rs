//! Stream frame types.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Address family tag used in the destination field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressFamily {
    /// IPv4 destination
    V4 = 4,
    /// IPv6 destination
    V6 = 6,
}

impl AddressFamily {
    /// Family of the given socket address.
    #[must_use]
    pub const fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::V4,
            SocketAddr::V6(_) => Self::V6,
        }
    }

    /// Parse the on-wire tag.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            4 => Some(Self::V4),
            6 => Some(Self::V6),
            _ => None,
        }
    }
}

/// A streaming datagram.
///
/// Frame format (40 bytes header, big-endian):
/// - Version: 1 byte
/// - Sequence Number: 8 bytes
/// - Node ID: 4 bytes (originating node)
/// - Timestamp: 8 bytes (nanoseconds of virtual time at send)
/// - Address Family: 1 byte (4 or 6)
/// - Destination IP: 16 bytes (IPv4 left-aligned, zero filled)
/// - Destination Port: 2 bytes
/// - Padding: zeros up to `packet_size`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Protocol version (currently 1)
    pub version: u8,
    /// Sequence number assigned by the sender
    pub sequence: u64,
    /// Identifier of the node that built the frame
    pub node_id: u32,
    /// Send time in nanoseconds
    pub timestamp_ns: u64,
    /// Endpoint the sender addressed the frame to
    pub destination: SocketAddr,
    /// Total datagram size, header included
    pub packet_size: usize,
}

impl StreamFrame {
    /// Header size in bytes
    pub const HEADER_SIZE: usize = 40;

    /// Current protocol version
    pub const VERSION: u8 = 1;

    /// Build a frame at the current protocol version.
    #[must_use]
    pub const fn new(
        sequence: u64,
        node_id: u32,
        timestamp_ns: u64,
        destination: SocketAddr,
        packet_size: usize,
    ) -> Self {
        Self {
            version: Self::VERSION,
            sequence,
            node_id,
            timestamp_ns,
            destination,
            packet_size,
        }
    }

    /// Number of padding bytes following the header.
    #[must_use]
    pub const fn padding_len(&self) -> usize {
        self.packet_size.saturating_sub(Self::HEADER_SIZE)
    }
}

impl Default for StreamFrame {
    fn default() -> Self {
        Self::new(
            0,
            0,
            0,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            Self::HEADER_SIZE,
        )
    }
}
