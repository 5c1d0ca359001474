//! Relay error types.

use std::fmt;

use cosign_proto::PeerId;
use thiserror::Error;

/// Errors from [`crate::RelayDriver`] event processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Request from a connection that was never accepted or already closed.
    ///
    /// The runtime raced a disconnect. The request is dropped; the connection
    /// task is about to end anyway.
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    /// Runtime handed out a peer id that is already registered.
    ///
    /// Peer ids come from 64 random bits, so this means the environment's RNG
    /// is broken. Fatal for the new connection.
    #[error("peer already exists: {0}")]
    PeerAlreadyExists(PeerId),
}

/// Errors that can occur in the relay runtime.
#[derive(Debug)]
pub enum RelayError {
    /// Configuration error (invalid bind address, unreadable TLS files).
    ///
    /// Prevents startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (connection failure, I/O error).
    ///
    /// Fatal for the affected connection only, unless raised while binding.
    Transport(String),

    /// Protocol error (oversized frame, undecodable request).
    ///
    /// A client sent malformed data. The relay drops that connection and
    /// keeps serving the others.
    Protocol(String),

    /// Driver error.
    Driver(DriverError),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for RelayError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<cosign_proto::ProtocolError> for RelayError {
    fn from(err: cosign_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn driver_error_is_source() {
        let err = RelayError::from(DriverError::PeerNotFound(PeerId::new(7)));
        assert_eq!(err.to_string(), "driver error: peer not found: 0000000000000007");
        assert!(err.source().is_some());
    }

    #[test]
    fn protocol_error_converts() {
        let err = RelayError::from(cosign_proto::ProtocolError::CborDecode("eof".into()));
        assert!(matches!(err, RelayError::Protocol(_)));
        assert!(err.source().is_none());
    }
}
