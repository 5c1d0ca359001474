//! Negotiation envelopes forwarded by the relay.
//!
//! The relay only reads `target_id`. Descriptions and candidates are opaque
//! blobs produced and consumed by the negotiation object on each side.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// Offer or answer blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Negotiation-object specific description.
    pub blob: String,
}

impl SessionDescription {
    /// Wrap a description blob.
    pub fn new(blob: impl Into<String>) -> Self {
        Self { blob: blob.into() }
    }
}

/// One connectivity candidate.
///
/// Candidates may arrive in any order relative to each other and to the
/// description exchange; each one is applied independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Negotiation-object specific candidate.
    pub blob: String,
}

impl IceCandidate {
    /// Wrap a candidate blob.
    pub fn new(blob: impl Into<String>) -> Self {
        Self { blob: blob.into() }
    }
}

/// Negotiation message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Signal {
    /// Initiator's session description.
    Offer(SessionDescription),
    /// Responder's session description.
    Answer(SessionDescription),
    /// Connectivity candidate from either side.
    Candidate(IceCandidate),
}

impl Signal {
    /// Discriminator without the payload.
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Offer(_) => SignalKind::Offer,
            Self::Answer(_) => SignalKind::Answer,
            Self::Candidate(_) => SignalKind::Candidate,
        }
    }
}

/// Discriminator of a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Offer
    Offer,
    /// Answer
    Answer,
    /// Candidate
    Candidate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        };
        f.write_str(name)
    }
}

/// One negotiation message addressed to a specific peer.
///
/// The relay overwrites `sender_id` with the sending connection's real id
/// before forwarding, so receivers can trust it as far as they trust the
/// relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingEnvelope {
    /// Originating peer
    pub sender_id: PeerId,
    /// Destination peer
    pub target_id: PeerId,
    /// Message body
    pub signal: Signal,
}
