//! Client side of cosign session negotiation.
//!
//! Action-based state machines that bootstrap a direct peer channel through a
//! rendezvous relay. They follow the same Sans-IO pattern as
//! [`cosign_core`]: events go in, actions come out, and the caller performs
//! all I/O.
//!
//! # Components
//!
//! - [`RendezvousClient`]: session membership on the relay
//! - [`Negotiator`]: offer/answer/candidate state machine
//! - [`NegotiationEvent`] / [`NegotiationAction`]: its inputs and outputs
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::connect_relay`]: QUIC connection to a relay
//! - [`transport::QuicPeer`]: QUIC negotiation object and direct channel

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod negotiator;
mod rendezvous;

#[cfg(feature = "transport")]
pub mod transport;

pub use error::{NegotiationError, RendezvousError};
pub use event::{
    DescriptionKind, NegotiationAction, NegotiationEvent, PeerCommand, PeerEvent, RendezvousEvent,
};
pub use negotiator::{NegotiationConfig, NegotiationState, Negotiator, PeerRole};
pub use rendezvous::RendezvousClient;
