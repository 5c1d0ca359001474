//! Fuzz target for SyncMessage::decode
//!
//! Channel text comes straight from the peer. Decoding must reject anything
//! malformed without panicking, and whatever it accepts must encode and
//! decode again as the same kind of message.

#![no_main]

use cosign_proto::SyncMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    if let Ok(message) = SyncMessage::decode(&text) {
        let encoded = message.encode().expect("accepted message must encode");
        let decoded = SyncMessage::decode(&encoded).expect("re-encoded message must decode");
        assert_eq!(decoded.kind(), message.kind());
    }
});
