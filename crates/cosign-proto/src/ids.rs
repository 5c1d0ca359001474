//! Session and peer identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Rendezvous key shared out-of-band between the two parties.
///
/// Opaque to the protocol. Restricted to a URL-safe alphabet so it can be
/// embedded in an invite reference without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Longest accepted identifier.
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a session identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, ProtocolError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= Self::MAX_LEN
            && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if valid { Ok(Self(value)) } else { Err(ProtocolError::InvalidSessionId(value)) }
    }

    /// Session identifier derived from 128 random bits.
    #[must_use]
    pub fn from_random(bits: u128) -> Self {
        Self(format!("{bits:032x}"))
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Relay-assigned identifier for one connected party.
///
/// Unique per relay connection. Zero is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(u64);

impl PeerId {
    /// Wrap a raw peer id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_rejects_empty_and_unsafe_characters() {
        assert!(SessionId::new("").is_err());
        assert!(SessionId::new("room/1").is_err());
        assert!(SessionId::new("has space").is_err());
        assert!(SessionId::new("a".repeat(SessionId::MAX_LEN + 1)).is_err());
        assert!(SessionId::new("contract-42_b").is_ok());
    }

    #[test]
    fn random_session_id_is_fixed_width_hex() {
        let id = SessionId::from_random(0xab);
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().ends_with("ab"));
        assert!(SessionId::new(id.as_str()).is_ok());
    }

    #[test]
    fn session_id_deserialization_validates() {
        let ok: Result<SessionId, _> = serde_json::from_str("\"abc\"");
        assert!(ok.is_ok());

        let bad: Result<SessionId, _> = serde_json::from_str("\"a b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn peer_id_displays_as_fixed_width_hex() {
        assert_eq!(PeerId::new(0x2a).to_string(), "000000000000002a");
    }
}
