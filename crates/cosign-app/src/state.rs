//! Observable application state types.
//!
//! The view model exposes the subset of session state needed for rendering,
//! without the negotiation machinery behind it.

use std::{fmt, str::FromStr};

use cosign_client::NegotiationState;

use crate::InviteError;

/// Application role, chosen out of band.
///
/// Independent of who sends the offer: either role may join first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantRole {
    /// Starts with write access and may grant or revoke it.
    Controller,
    /// Starts read-only; drawing follows the controller's grants.
    Guest,
}

impl ParticipantRole {
    /// Write access at session start.
    pub fn initial_write_access(self) -> bool {
        matches!(self, Self::Controller)
    }

    /// Whether this role may change write access.
    pub fn may_set_control(self) -> bool {
        matches!(self, Self::Controller)
    }

    /// Value used in invite references and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = InviteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "controller" | "agent" => Ok(Self::Controller),
            "guest" | "customer" => Ok(Self::Guest),
            other => Err(InviteError::UnknownRole(other.to_string())),
        }
    }
}

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the other party to join.
    Waiting,
    /// Offer/answer exchange in progress.
    Negotiating,
    /// Direct channel open.
    Connected,
    /// Session over (closed or failed).
    Ended {
        /// Ended by an error rather than a teardown.
        failed: bool,
    },
}

impl ConnectionState {
    /// Derive the status from negotiation state and reported connectivity.
    pub fn from_session(negotiation: NegotiationState, connectivity: bool) -> Self {
        match negotiation {
            NegotiationState::Closed => Self::Ended { failed: false },
            NegotiationState::Failed => Self::Ended { failed: true },
            _ if connectivity => Self::Connected,
            NegotiationState::Idle | NegotiationState::Joined => Self::Waiting,
            NegotiationState::OfferSent
            | NegotiationState::OfferReceived
            | NegotiationState::Answered
            | NegotiationState::Connected => Self::Negotiating,
        }
    }

    /// Short label for status bars.
    pub fn label(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Ended { failed: false } => "closed",
            Self::Ended { failed: true } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_round_trip() {
        for role in [ParticipantRole::Controller, ParticipantRole::Guest] {
            assert_eq!(role.as_str().parse::<ParticipantRole>().ok(), Some(role));
        }
        assert_eq!("agent".parse::<ParticipantRole>().ok(), Some(ParticipantRole::Controller));
        assert!("admin".parse::<ParticipantRole>().is_err());
    }

    #[test]
    fn connected_requires_reported_connectivity() {
        assert_eq!(
            ConnectionState::from_session(NegotiationState::Connected, false),
            ConnectionState::Negotiating
        );
        assert_eq!(
            ConnectionState::from_session(NegotiationState::Connected, true),
            ConnectionState::Connected
        );
        assert_eq!(
            ConnectionState::from_session(NegotiationState::Failed, true),
            ConnectionState::Ended { failed: true }
        );
    }
}
