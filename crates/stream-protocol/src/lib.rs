//! Wire framing for the streaming traffic generator.
//!
//! Every datagram exchanged between a streaming client and server starts
//! with a fixed-size header carrying the sequence number, the originating
//! node, the sender's virtual timestamp and the nominal destination. The
//! rest of the datagram is zero padding up to the configured packet size,
//! so the header is what receivers use for one-way delay accounting.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod frame;

pub use codec::{decode_frame, encode_frame, CodecError};
pub use frame::StreamFrame;
