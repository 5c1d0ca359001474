//! Error types for rendezvous and negotiation.

use std::time::Duration;

use cosign_proto::{PeerId, Rejection, SessionId, SignalKind};
use thiserror::Error;

use crate::negotiator::NegotiationState;

/// Errors from the rendezvous client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendezvousError {
    /// Operation requires an acknowledged join.
    #[error("cannot {operation} before joining a session")]
    NotJoined {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// A join was already requested on this connection.
    #[error("already joined session {session_id}")]
    AlreadyJoined {
        /// Session that was joined first
        session_id: SessionId,
    },

    /// The relay refused our join.
    #[error("join rejected by relay: {} ({})", .0.reason, .0.code)]
    JoinRejected(Rejection),

    /// Envelope addressed to someone else.
    #[error("envelope addressed to {target_id} delivered to {local_id}")]
    Misaddressed {
        /// Our peer id
        local_id: PeerId,
        /// Peer the envelope was meant for
        target_id: PeerId,
    },
}

impl RendezvousError {
    /// Whether the session attempt cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::JoinRejected(_))
    }
}

/// Errors from the session negotiator.
///
/// Fatal errors move the negotiator to [`NegotiationState::Failed`]. They are
/// never retried; the caller may start again with a fresh negotiator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Operation not valid in the current state. The state is unchanged.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: NegotiationState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Signal that contradicts the offer/answer exchange.
    #[error("unexpected {kind} in state {state:?}")]
    UnexpectedSignal {
        /// Current state when the signal arrived
        state: NegotiationState,
        /// Kind of the offending signal
        kind: SignalKind,
    },

    /// Rendezvous layer failure.
    #[error("rendezvous: {0}")]
    Rendezvous(#[from] RendezvousError),

    /// Relay connection lost before the direct channel was established.
    #[error("relay unreachable during negotiation")]
    RelayLost,

    /// The negotiation object reported an unrecoverable failure.
    #[error("peer connection failed: {reason}")]
    PeerFailed {
        /// Failure detail from the negotiation object
        reason: String,
    },

    /// Offer/answer exchange did not complete in time.
    #[error("negotiation timeout after {elapsed:?}")]
    Timeout {
        /// Time spent negotiating
        elapsed: Duration,
    },
}

impl NegotiationError {
    /// Whether this error ends the session attempt.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidState { .. } => false,
            Self::Rendezvous(e) => e.is_fatal(),
            Self::UnexpectedSignal { .. }
            | Self::RelayLost
            | Self::PeerFailed { .. }
            | Self::Timeout { .. } => true,
        }
    }
}
