//! Fuzz target for relay message decoding
//!
//! Relay requests and notices are CBOR bodies read off the network. Tests
//! malformed CBOR, type confusion between the two directions and oversized
//! strings or collections.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use cosign_proto::{RelayNotice, RelayRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = RelayRequest::decode(data) {
        let mut body = Vec::new();
        request.encode(&mut body).expect("accepted request must encode");
        assert_eq!(RelayRequest::decode(&body).expect("re-encoded request must decode"), request);
    }

    let _ = RelayNotice::decode(data);
});
