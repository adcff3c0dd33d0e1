#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use stream_protocol::codec::{decode_frame, encode_frame};

fuzz_target!(|data: &[u8]| {
    let mut buf = Bytes::copy_from_slice(data);

    // Arbitrary datagrams must decode or error, never panic
    if let Ok(frame) = decode_frame(&mut buf) {
        // Anything that decodes re-encodes to the same length
        let encoded = encode_frame(&frame).expect("decoded frame holds its header");
        assert_eq!(encoded.len(), data.len());
    }
});
