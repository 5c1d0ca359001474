//! Fuzz target for length-delimited framing
//!
//! Feeds arbitrary bytes to the stream decoder to find:
//! - Panics on truncated or oversized length prefixes
//! - Bodies returned past the buffer end
//! - Decoders that stop consuming without reporting an error
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::BytesMut;
use cosign_proto::codec::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE, decode_exact, decode_frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_exact(data);

    let mut buf = BytesMut::from(data);
    loop {
        let before = buf.len();
        match decode_frame(&mut buf) {
            Ok(Some(body)) => {
                assert!(body.len() <= MAX_FRAME_SIZE);
                assert_eq!(buf.len(), before - LENGTH_PREFIX_SIZE - body.len());
            },
            Ok(None) => {
                assert_eq!(buf.len(), before, "incomplete frame must not be consumed");
                break;
            },
            Err(_) => break,
        }
    }
});
