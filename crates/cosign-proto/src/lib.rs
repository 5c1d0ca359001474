//! Wire protocol for cosign.
//!
//! Two independent encodings live here:
//!
//! - **Relay protocol**: [`RelayRequest`] and [`RelayNotice`] exchanged with
//!   the rendezvous relay. CBOR bodies inside length-delimited frames (see
//!   [`codec`]). The relay routes [`SignalingEnvelope`]s by peer id and never
//!   looks inside them.
//! - **Sync protocol**: [`SyncMessage`] records carried as JSON text over the
//!   direct peer channel once negotiation succeeds.
//!
//! Nothing in this crate performs I/O.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
mod errors;
mod ids;
mod relay;
mod signal;
mod sync;

pub use errors::{DecodeError, ProtocolError, Result};
pub use ids::{PeerId, SessionId};
pub use relay::{Rejection, RelayNotice, RelayRequest};
pub use signal::{IceCandidate, SessionDescription, Signal, SignalKind, SignalingEnvelope};
pub use sync::{Point, Stroke, SyncMessage};

/// ALPN identifier for client to relay connections.
pub const RELAY_ALPN: &[u8] = b"cosign-relay";

/// ALPN identifier for direct peer connections.
pub const PEER_ALPN: &[u8] = b"cosign-peer";

/// Label sent as the first frame on a freshly opened peer channel.
pub const CHANNEL_LABEL: &str = "cosign-sync";
