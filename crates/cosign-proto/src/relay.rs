//! Client/relay messages.
//!
//! Each message is CBOR-encoded and carried in one length-delimited frame (see
//! [`crate::codec`]). Requests flow client → relay on a single ordered stream,
//! so a `Join` is always processed before the `Signal`s that follow it.

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    PeerId, SessionId, SignalingEnvelope,
    errors::{ProtocolError, Result},
};

/// Client → relay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayRequest {
    /// Subscribe this connection to a session.
    Join {
        /// Session to join
        session_id: SessionId,
    },
    /// Forward an envelope to another peer in the same session.
    Signal(SignalingEnvelope),
    /// Unsubscribe from the current session.
    Leave,
}

/// Relay → client notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayNotice {
    /// Join accepted.
    Joined {
        /// Id the relay assigned to this connection
        peer_id: PeerId,
        /// Session that was joined
        session_id: SessionId,
        /// Peers already present, in join order
        peers: Vec<PeerId>,
    },
    /// Another peer joined the session.
    PeerJoined {
        /// The new peer
        peer_id: PeerId,
    },
    /// A peer left the session or disconnected.
    PeerLeft {
        /// The departed peer
        peer_id: PeerId,
    },
    /// Envelope forwarded from another peer.
    Signal(SignalingEnvelope),
    /// Request refused.
    Rejected(Rejection),
}

/// Why the relay refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Machine-readable reason.
    pub code: u16,
    /// Human-readable detail.
    pub reason: String,
}

impl Rejection {
    /// Session already holds two peers.
    pub const SESSION_FULL: u16 = 0x0001;
    /// Connection already joined a session.
    pub const ALREADY_JOINED: u16 = 0x0002;
    /// Signal or leave sent before joining.
    pub const NOT_JOINED: u16 = 0x0003;
    /// Signal target is not in the sender's session.
    pub const PEER_NOT_FOUND: u16 = 0x0004;
    /// Relay is at its session limit.
    pub const CAPACITY: u16 = 0x0005;

    /// Session already holds two peers.
    pub fn session_full(session_id: &SessionId) -> Self {
        Self { code: Self::SESSION_FULL, reason: format!("session {session_id} is full") }
    }

    /// Connection already joined a session.
    pub fn already_joined(session_id: &SessionId) -> Self {
        Self { code: Self::ALREADY_JOINED, reason: format!("already joined {session_id}") }
    }

    /// Signal or leave sent before joining.
    pub fn not_joined() -> Self {
        Self { code: Self::NOT_JOINED, reason: "not joined to a session".to_string() }
    }

    /// Signal target is not in the sender's session.
    pub fn peer_not_found(peer_id: PeerId) -> Self {
        Self { code: Self::PEER_NOT_FOUND, reason: format!("peer {peer_id} not in session") }
    }

    /// Relay is at its session limit.
    pub fn capacity() -> Self {
        Self { code: Self::CAPACITY, reason: "relay session limit reached".to_string() }
    }
}

impl RelayRequest {
    /// Encode as CBOR into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        encode_cbor(self, dst)
    }

    /// Decode from a CBOR frame body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        decode_cbor(body)
    }
}

impl RelayNotice {
    /// Encode as CBOR into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        encode_cbor(self, dst)
    }

    /// Decode from a CBOR frame body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        decode_cbor(body)
    }
}

fn encode_cbor<T: Serialize>(value: &T, dst: &mut impl BufMut) -> Result<()> {
    ciborium::ser::into_writer(value, dst.writer())
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn decode_cbor<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    ciborium::de::from_reader(body).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{SessionDescription, Signal};

    #[test]
    fn signal_request_survives_cbor() {
        let request = RelayRequest::Signal(SignalingEnvelope {
            sender_id: PeerId::new(1),
            target_id: PeerId::new(2),
            signal: Signal::Offer(SessionDescription::new("v=0")),
        });

        let mut buf = Vec::new();
        request.encode(&mut buf).unwrap();

        assert_eq!(RelayRequest::decode(&buf).unwrap(), request);
    }

    #[test]
    fn invalid_session_id_is_rejected_on_decode() {
        #[derive(Serialize)]
        enum Raw {
            Join { session_id: String },
        }

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Raw::Join { session_id: "a b".into() }, &mut buf).unwrap();

        assert!(matches!(RelayRequest::decode(&buf), Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let result = RelayNotice::decode(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn rejection_codes_are_distinct() {
        let session = SessionId::new("s").unwrap();
        let codes = [
            Rejection::session_full(&session).code,
            Rejection::already_joined(&session).code,
            Rejection::not_joined().code,
            Rejection::peer_not_found(PeerId::new(9)).code,
            Rejection::capacity().code,
        ];

        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
