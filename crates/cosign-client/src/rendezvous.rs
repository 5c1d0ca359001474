//! Session membership on the relay.
//!
//! Tracks which session was requested, which peer id the relay assigned, and
//! turns relay notices into [`RendezvousEvent`]s. Outgoing envelopes are
//! stamped with the local peer id; the relay overwrites it anyway, so this
//! only keeps our own view consistent.

use cosign_proto::{PeerId, RelayNotice, RelayRequest, SessionId, Signal, SignalingEnvelope};

use crate::{error::RendezvousError, event::RendezvousEvent};

/// Sans-IO rendezvous client.
#[derive(Debug, Clone, Default)]
pub struct RendezvousClient {
    /// Session requested with `join`
    session_id: Option<SessionId>,
    /// Id assigned by the relay once the join is acknowledged
    local_id: Option<PeerId>,
}

impl RendezvousClient {
    /// Client that has not joined anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session requested, acknowledged or not.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Our peer id. `None` until the relay acknowledges the join.
    pub fn local_id(&self) -> Option<PeerId> {
        self.local_id
    }

    /// Whether the relay acknowledged our join.
    pub fn is_joined(&self) -> bool {
        self.local_id.is_some()
    }

    /// Request to subscribe to `session_id`.
    pub fn join(&mut self, session_id: SessionId) -> Result<RelayRequest, RendezvousError> {
        if let Some(current) = &self.session_id {
            return Err(RendezvousError::AlreadyJoined { session_id: current.clone() });
        }

        self.session_id = Some(session_id.clone());
        Ok(RelayRequest::Join { session_id })
    }

    /// Envelope carrying `signal` to `target_id`.
    pub fn send(&self, target_id: PeerId, signal: Signal) -> Result<RelayRequest, RendezvousError> {
        let Some(sender_id) = self.local_id else {
            return Err(RendezvousError::NotJoined { operation: "send" });
        };

        Ok(RelayRequest::Signal(SignalingEnvelope { sender_id, target_id, signal }))
    }

    /// Request to leave the session. `None` if nothing was joined.
    pub fn leave(&mut self) -> Option<RelayRequest> {
        self.local_id = None;
        self.session_id.take().map(|_| RelayRequest::Leave)
    }

    /// Interpret a relay notice.
    ///
    /// # Errors
    ///
    /// - `NotJoined` for session notices before any join was requested
    /// - `JoinRejected` if the relay refuses a pending join
    /// - `Misaddressed` for an envelope targeting another peer
    pub fn handle_notice(
        &mut self,
        notice: RelayNotice,
    ) -> Result<RendezvousEvent, RendezvousError> {
        if self.session_id.is_none() {
            return Err(RendezvousError::NotJoined { operation: "handle notice" });
        }

        match notice {
            RelayNotice::Joined { peer_id, session_id, peers } => {
                self.local_id = Some(peer_id);
                self.session_id = Some(session_id.clone());
                Ok(RendezvousEvent::Joined { local_id: peer_id, session_id, peers })
            },
            RelayNotice::PeerJoined { peer_id } => Ok(RendezvousEvent::PeerJoined(peer_id)),
            RelayNotice::PeerLeft { peer_id } => Ok(RendezvousEvent::PeerLeft(peer_id)),
            RelayNotice::Signal(envelope) => {
                if let Some(local_id) = self.local_id {
                    if envelope.target_id != local_id {
                        return Err(RendezvousError::Misaddressed {
                            local_id,
                            target_id: envelope.target_id,
                        });
                    }
                }
                Ok(RendezvousEvent::Signal { sender_id: envelope.sender_id, signal: envelope.signal })
            },
            RelayNotice::Rejected(rejection) => {
                if self.local_id.is_none() {
                    self.session_id = None;
                    return Err(RendezvousError::JoinRejected(rejection));
                }
                Ok(RendezvousEvent::Rejected(rejection))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cosign_proto::{Rejection, SessionDescription};

    use super::*;

    fn session() -> SessionId {
        SessionId::new("room-1").unwrap()
    }

    fn joined(local: u64) -> RendezvousClient {
        let mut client = RendezvousClient::new();
        client.join(session()).unwrap();
        client
            .handle_notice(RelayNotice::Joined {
                peer_id: PeerId::new(local),
                session_id: session(),
                peers: vec![],
            })
            .unwrap();
        client
    }

    #[test]
    fn join_twice_is_rejected_locally() {
        let mut client = RendezvousClient::new();
        client.join(session()).unwrap();

        let err = client.join(SessionId::new("other").unwrap()).unwrap_err();

        assert_eq!(err, RendezvousError::AlreadyJoined { session_id: session() });
    }

    #[test]
    fn send_before_ack_fails() {
        let mut client = RendezvousClient::new();
        client.join(session()).unwrap();

        let err = client
            .send(PeerId::new(2), Signal::Offer(SessionDescription::new("x")))
            .unwrap_err();

        assert_eq!(err, RendezvousError::NotJoined { operation: "send" });
    }

    #[test]
    fn send_stamps_local_id() {
        let client = joined(7);

        let request =
            client.send(PeerId::new(9), Signal::Offer(SessionDescription::new("x"))).unwrap();

        let RelayRequest::Signal(envelope) = request else { panic!("expected signal") };
        assert_eq!(envelope.sender_id, PeerId::new(7));
        assert_eq!(envelope.target_id, PeerId::new(9));
    }

    #[test]
    fn misaddressed_envelope_is_an_error() {
        let mut client = joined(7);

        let err = client
            .handle_notice(RelayNotice::Signal(SignalingEnvelope {
                sender_id: PeerId::new(9),
                target_id: PeerId::new(8),
                signal: Signal::Offer(SessionDescription::new("x")),
            }))
            .unwrap_err();

        assert!(matches!(err, RendezvousError::Misaddressed { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn rejection_of_pending_join_is_fatal_and_resets() {
        let mut client = RendezvousClient::new();
        client.join(session()).unwrap();

        let err = client
            .handle_notice(RelayNotice::Rejected(Rejection::session_full(&session())))
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(client.session_id().is_none());
        assert!(client.join(session()).is_ok());
    }

    #[test]
    fn rejection_after_join_is_an_event() {
        let mut client = joined(7);

        let event =
            client.handle_notice(RelayNotice::Rejected(Rejection::peer_not_found(PeerId::new(3))));

        assert!(matches!(event, Ok(RendezvousEvent::Rejected(_))));
    }

    #[test]
    fn leave_forgets_membership() {
        let mut client = joined(7);

        assert_eq!(client.leave(), Some(RelayRequest::Leave));
        assert_eq!(client.leave(), None);
        assert!(!client.is_joined());
    }
}
