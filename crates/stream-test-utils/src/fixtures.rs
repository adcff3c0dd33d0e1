//! Pre-configured addresses, session configs and frames.

use bytes::{Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use stream_protocol::{decode_frame, encode_frame, StreamFrame};
use streaming_app::config::SessionConfig;
use streaming_app::rate::DataRate;
use streaming_app::runtime::{Endpoint, SimTime};

pub const SERVER_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(7, 0, 0, 2));
pub const CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(7, 0, 0, 3));
pub const SERVER_PORT: u16 = 2000;
pub const CLIENT_PORT: u16 = 1000;

#[must_use]
pub fn server_addr() -> Endpoint {
    SocketAddr::new(SERVER_IP, SERVER_PORT)
}

#[must_use]
pub fn client_addr() -> Endpoint {
    SocketAddr::new(CLIENT_IP, CLIENT_PORT)
}

/// A second requester, for peer switch tests.
#[must_use]
pub fn other_addr() -> Endpoint {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(7, 0, 0, 9)), 5555)
}

/// Server with 1000-byte packets at 8 kb/s: exactly one packet per second.
///
/// The request interval is long enough that liveness never interferes
/// unless a test shortens it.
#[must_use]
pub fn server_config() -> SessionConfig {
    SessionConfig::server(server_addr())
        .with_packet_size(1000)
        .with_data_rate(DataRate::from_kbps(8))
        .with_request_interval(Duration::from_secs(30))
}

/// Client requesting from [`server_addr`] every 0.5 s.
#[must_use]
pub fn client_config() -> SessionConfig {
    SessionConfig::client(server_addr())
        .with_local(client_addr())
        .with_packet_size(100)
        .with_request_interval(Duration::from_millis(500))
}

/// An encoded request frame as a client would send it.
#[must_use]
pub fn request_frame(to: Endpoint, sequence: u64, sent_at: SimTime) -> Bytes {
    frame_bytes(to, sequence, sent_at, 100)
}

/// An encoded stream frame of `packet_size` bytes stamped `sent_at`.
#[must_use]
pub fn frame_bytes(to: Endpoint, sequence: u64, sent_at: SimTime, packet_size: usize) -> Bytes {
    let frame = StreamFrame::new(sequence, 1, sent_at.as_nanos(), to, packet_size);
    encode_frame(&frame).expect("fixture frame should encode")
}

/// Decode a datagram captured from a session.
#[must_use]
pub fn decode(datagram: &Bytes) -> StreamFrame {
    let mut buf = datagram.clone();
    decode_frame(&mut buf).expect("captured datagram should decode")
}

/// A datagram too short to carry a stream header.
#[must_use]
pub fn garbage_datagram() -> Bytes {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"not a frame");
    buf.freeze()
}
