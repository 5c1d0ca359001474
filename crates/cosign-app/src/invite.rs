//! Shareable session references.
//!
//! `cosign://<relay-addr>/<session-id>?role=<role>`. The role parameter is
//! optional and defaults to guest, since an invite is normally handed to the
//! other party.

use std::{fmt, str::FromStr};

use cosign_proto::{ProtocolError, SessionId};
use thiserror::Error;

use crate::ParticipantRole;

const SCHEME: &str = "cosign://";

/// Errors parsing an invite reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InviteError {
    /// Does not start with `cosign://`.
    #[error("invite must start with {SCHEME}")]
    MissingScheme,

    /// No relay address before the session path.
    #[error("invite has no relay address")]
    MissingRelay,

    /// Session path segment is missing or invalid.
    #[error("invalid session in invite: {0}")]
    InvalidSession(#[from] ProtocolError),

    /// Unknown role value.
    #[error("unknown role: {0:?}")]
    UnknownRole(String),
}

/// Everything the other party needs to join a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    /// Relay address (`host:port`)
    pub relay: String,
    /// Session to join
    pub session_id: SessionId,
    /// Role the holder takes
    pub role: ParticipantRole,
}

impl Invite {
    /// The same session, as seen by the other party.
    pub fn for_guest(&self) -> Self {
        Self { role: ParticipantRole::Guest, ..self.clone() }
    }
}

impl fmt::Display for Invite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}?role={}", self.relay, self.session_id, self.role)
    }
}

impl FromStr for Invite {
    type Err = InviteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix(SCHEME).ok_or(InviteError::MissingScheme)?;
        let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (relay, session) = location.split_once('/').unwrap_or((location, ""));

        if relay.is_empty() {
            return Err(InviteError::MissingRelay);
        }
        let session_id = SessionId::new(session.trim_end_matches('/'))?;

        let mut role = ParticipantRole::Guest;
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            if let Some(value) = pair.strip_prefix("role=") {
                role = value.parse()?;
            }
        }

        Ok(Self { relay: relay.to_string(), session_id, role })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn invite(role: ParticipantRole) -> Invite {
        Invite {
            relay: "127.0.0.1:4433".into(),
            session_id: SessionId::new("3f2a9c").unwrap(),
            role,
        }
    }

    #[test]
    fn renders_guest_reference() {
        let host = invite(ParticipantRole::Controller);
        assert_eq!(host.for_guest().to_string(), "cosign://127.0.0.1:4433/3f2a9c?role=guest");
    }

    #[test]
    fn parses_what_it_renders() {
        let original = invite(ParticipantRole::Controller);
        assert_eq!(original.to_string().parse::<Invite>().unwrap(), original);
    }

    #[test]
    fn role_defaults_to_guest() {
        let parsed: Invite = "cosign://relay.example:4433/doc".parse().unwrap();
        assert_eq!(parsed.role, ParticipantRole::Guest);
        assert_eq!(parsed.relay, "relay.example:4433");
        assert_eq!(parsed.session_id.as_str(), "doc");
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!("https://x/doc".parse::<Invite>(), Err(InviteError::MissingScheme));
        assert_eq!("cosign:///doc".parse::<Invite>(), Err(InviteError::MissingRelay));
        assert!(matches!(
            "cosign://relay:1/".parse::<Invite>(),
            Err(InviteError::InvalidSession(_))
        ));
        assert_eq!(
            "cosign://relay:1/doc?role=owner".parse::<Invite>(),
            Err(InviteError::UnknownRole("owner".into()))
        );
    }
}
