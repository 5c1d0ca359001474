//! Negotiation events and actions.

use cosign_proto::{
    IceCandidate, PeerId, Rejection, RelayNotice, RelayRequest, SessionDescription, SessionId,
    Signal,
};

/// Which half of the description exchange a blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    /// Produced by the initiator
    Offer,
    /// Produced by the responder
    Answer,
}

/// Events the caller feeds into the negotiator.
///
/// The caller is responsible for:
/// - Forwarding relay notices and reporting relay loss
/// - Forwarding what the negotiation object produces
/// - Driving time forward via ticks
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    /// Join a session on the relay.
    Join {
        /// Session to join
        session_id: SessionId,
    },

    /// Notice received from the relay.
    Relay(RelayNotice),

    /// Output of the negotiation object.
    Peer(PeerEvent),

    /// The relay connection dropped.
    RelayDisconnected,

    /// Local teardown (session ended).
    Close,

    /// Time tick for timeout processing.
    Tick,
}

/// What the negotiation object reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Local description produced after `CreateOffer` or `CreateAnswer`.
    LocalDescription(SessionDescription),

    /// Local connectivity candidate discovered.
    LocalCandidate(IceCandidate),

    /// A remote candidate could not be applied.
    CandidateRejected {
        /// The candidate
        candidate: IceCandidate,
        /// Why it was rejected
        reason: String,
    },

    /// The direct channel is open.
    ChannelOpen,

    /// The direct channel closed.
    ChannelClosed,

    /// The negotiation object gave up.
    Failed {
        /// Failure detail
        reason: String,
    },
}

/// Commands for the negotiation object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    /// Prepare the direct channel (initiator side).
    OpenChannel,

    /// Produce an offer description.
    CreateOffer,

    /// Produce an answer description.
    CreateAnswer,

    /// Apply the other side's description.
    SetRemoteDescription {
        /// Offer or answer
        kind: DescriptionKind,
        /// The description
        description: SessionDescription,
    },

    /// Apply one remote candidate. Failures are reported, not fatal.
    AddCandidate(IceCandidate),

    /// Release the negotiation object and its channel.
    Close,
}

/// Actions the negotiator produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationAction {
    /// Send a request to the relay.
    Relay(RelayRequest),

    /// Execute a command on the negotiation object.
    Peer(PeerCommand),

    /// Connectivity changed.
    Connectivity(bool),
}

/// Relay notice as seen by a session member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousEvent {
    /// Our join was accepted.
    Joined {
        /// Id the relay assigned to us
        local_id: PeerId,
        /// Session joined
        session_id: SessionId,
        /// Peers already present, in join order
        peers: Vec<PeerId>,
    },

    /// Another party joined.
    PeerJoined(PeerId),

    /// Another party left.
    PeerLeft(PeerId),

    /// Negotiation message from another party.
    Signal {
        /// Originating peer, as stamped by the relay
        sender_id: PeerId,
        /// Message body
        signal: Signal,
    },

    /// The relay refused a request after we joined.
    Rejected(Rejection),
}
