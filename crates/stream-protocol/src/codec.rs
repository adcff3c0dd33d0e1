//! Codec for encoding and decoding stream frames.

use crate::frame::{AddressFamily, StreamFrame};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Insufficient data to decode
    #[error("Insufficient data")]
    InsufficientData,

    /// Requested packet size cannot hold the header
    #[error("Packet size {size} is smaller than the {header}-byte header")]
    PacketTooSmall {
        /// Requested packet size
        size: usize,
        /// Header size
        header: usize,
    },

    /// Unsupported version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid address family tag
    #[error("Invalid address family: {0}")]
    InvalidAddressFamily(u8),
}

/// Encode a stream frame to a datagram of exactly `frame.packet_size` bytes.
///
/// # Errors
///
/// Returns `PacketTooSmall` if the packet size cannot hold the header.
pub fn encode_frame(frame: &StreamFrame) -> Result<Bytes, CodecError> {
    if frame.packet_size < StreamFrame::HEADER_SIZE {
        return Err(CodecError::PacketTooSmall {
            size: frame.packet_size,
            header: StreamFrame::HEADER_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(frame.packet_size);

    // Version (1 byte)
    buf.put_u8(frame.version);

    // Sequence Number (8 bytes)
    buf.put_u64(frame.sequence);

    // Node ID (4 bytes)
    buf.put_u32(frame.node_id);

    // Timestamp (8 bytes)
    buf.put_u64(frame.timestamp_ns);

    // Address Family (1 byte)
    buf.put_u8(AddressFamily::of(&frame.destination) as u8);

    // Destination IP (16 bytes)
    match frame.destination.ip() {
        IpAddr::V4(ip) => {
            buf.put_slice(&ip.octets());
            buf.put_bytes(0, 12);
        }
        IpAddr::V6(ip) => buf.put_slice(&ip.octets()),
    }

    // Destination Port (2 bytes)
    buf.put_u16(frame.destination.port());

    // Padding
    buf.put_bytes(0, frame.padding_len());

    Ok(buf.freeze())
}

/// Decode a stream frame from a whole datagram.
///
/// Consumes the buffer; everything after the header is treated as padding
/// and counted into `packet_size`.
///
/// # Errors
///
/// Returns an error if the header is truncated or malformed.
pub fn decode_frame(data: &mut impl Buf) -> Result<StreamFrame, CodecError> {
    // Check if we have enough data for the header
    let packet_size = data.remaining();
    if packet_size < StreamFrame::HEADER_SIZE {
        return Err(CodecError::InsufficientData);
    }

    // Version (1 byte)
    let version = data.get_u8();
    if version != StreamFrame::VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    // Sequence Number (8 bytes)
    let sequence = data.get_u64();

    // Node ID (4 bytes)
    let node_id = data.get_u32();

    // Timestamp (8 bytes)
    let timestamp_ns = data.get_u64();

    // Address Family (1 byte)
    let family_tag = data.get_u8();
    let family =
        AddressFamily::from_u8(family_tag).ok_or(CodecError::InvalidAddressFamily(family_tag))?;

    // Destination IP (16 bytes)
    let mut octets = [0u8; 16];
    data.copy_to_slice(&mut octets);
    let ip = match family {
        AddressFamily::V4 => {
            let [a, b, c, d, ..] = octets;
            IpAddr::V4(Ipv4Addr::new(a, b, c, d))
        }
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(octets)),
    };

    // Destination Port (2 bytes)
    let port = data.get_u16();

    // Padding - skip
    data.advance(data.remaining());

    Ok(StreamFrame {
        version,
        sequence,
        node_id,
        timestamp_ns,
        destination: SocketAddr::new(ip, port),
        packet_size,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample_frame(packet_size: usize) -> StreamFrame {
        StreamFrame::new(
            7,
            3,
            1_250_000_000,
            "7.0.0.2:2000".parse().unwrap(),
            packet_size,
        )
    }

    #[test]
    fn test_encoded_length_matches_packet_size() {
        let encoded = encode_frame(&sample_frame(1472)).unwrap();
        assert_eq!(encoded.len(), 1472);

        let header_only = encode_frame(&sample_frame(StreamFrame::HEADER_SIZE)).unwrap();
        assert_eq!(header_only.len(), StreamFrame::HEADER_SIZE);
    }

    #[test]
    fn test_header_is_at_front_and_padding_is_zero() {
        let encoded = encode_frame(&sample_frame(100)).unwrap();

        assert_eq!(encoded[0], StreamFrame::VERSION);
        // IPv4 family tag sits right after version, seq, node id, timestamp
        assert_eq!(encoded[21], 4);
        assert_eq!(&encoded[22..26], &[7, 0, 0, 2]);
        assert!(encoded[StreamFrame::HEADER_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_recovers_header_and_size() {
        let frame = sample_frame(512);
        let mut encoded = encode_frame(&frame).unwrap();

        let decoded = decode_frame(&mut encoded).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(encoded.remaining(), 0);
    }

    #[test]
    fn test_decode_ipv6_destination() {
        let mut frame = sample_frame(64);
        frame.destination = "[2001:db8::1]:4000".parse().unwrap();

        let mut encoded = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&mut encoded).unwrap();
        assert_eq!(decoded.destination, frame.destination);
    }

    #[test]
    fn test_encode_rejects_undersized_packet() {
        let result = encode_frame(&sample_frame(12));
        assert!(matches!(
            result,
            Err(CodecError::PacketTooSmall { size: 12, header: 40 })
        ));
    }

    #[test]
    fn test_decode_truncated_header() {
        let mut short = Bytes::from_static(&[1u8; 20]);
        assert!(matches!(
            decode_frame(&mut short),
            Err(CodecError::InsufficientData)
        ));
    }

    #[test]
    fn test_decode_unknown_version() {
        let mut raw = BytesMut::from(&encode_frame(&sample_frame(64)).unwrap()[..]);
        raw[0] = 9;
        assert!(matches!(
            decode_frame(&mut raw.freeze()),
            Err(CodecError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_decode_unknown_family() {
        let mut raw = BytesMut::from(&encode_frame(&sample_frame(64)).unwrap()[..]);
        raw[21] = 5;
        assert!(matches!(
            decode_frame(&mut raw.freeze()),
            Err(CodecError::InvalidAddressFamily(5))
        ));
    }
}
