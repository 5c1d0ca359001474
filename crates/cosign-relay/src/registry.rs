//! Session registry for rendezvous membership tracking.
//!
//! The registry maintains bidirectional mappings: session → peers (in join
//! order, for fan-out) and peer → session (for routing checks and cleanup on
//! disconnect).
//!
//! A session exists while it has at least one member. It is created by the
//! first join and removed when its last member leaves, so a session id can be
//! reused once a collaboration ends.

use std::collections::HashMap;

use cosign_proto::{PeerId, Rejection, SessionId};

/// A session admits at most two peers.
pub const MAX_PEERS_PER_SESSION: usize = 2;

/// Registry for tracking connected peers and their session membership.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Peer ID → session it joined, if any
    peers: HashMap<PeerId, Option<SessionId>>,
    /// Session ID → members in join order
    sessions: HashMap<SessionId, Vec<PeerId>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns `false` if the peer id is already in use.
    pub fn register_peer(&mut self, peer_id: PeerId) -> bool {
        if self.peers.contains_key(&peer_id) {
            return false;
        }
        self.peers.insert(peer_id, None);
        true
    }

    /// Unregister a connection, removing it from its session.
    ///
    /// Returns `None` if the peer was never registered. Otherwise returns the
    /// session it was in (if any) together with the members left behind.
    pub fn unregister_peer(&mut self, peer_id: PeerId) -> Option<Option<(SessionId, Vec<PeerId>)>> {
        let session_id = self.peers.remove(&peer_id)?;
        Some(session_id.map(|session_id| {
            let remaining = self.remove_member(&session_id, peer_id);
            (session_id, remaining)
        }))
    }

    /// Add a registered peer to a session.
    ///
    /// Returns the members already present, in join order. On failure returns
    /// the rejection to send back to the peer.
    pub fn join(&mut self, peer_id: PeerId, session_id: &SessionId) -> Result<Vec<PeerId>, Rejection> {
        let Some(current) = self.peers.get_mut(&peer_id) else {
            return Err(Rejection::not_joined());
        };

        if let Some(existing) = current {
            return Err(Rejection::already_joined(existing));
        }

        let members = self.sessions.entry(session_id.clone()).or_default();
        if members.len() >= MAX_PEERS_PER_SESSION {
            return Err(Rejection::session_full(session_id));
        }

        let present = members.clone();
        members.push(peer_id);
        *current = Some(session_id.clone());

        Ok(present)
    }

    /// Remove a peer from its session, keeping the connection registered.
    ///
    /// Returns `None` if the peer is not in a session.
    pub fn leave(&mut self, peer_id: PeerId) -> Option<(SessionId, Vec<PeerId>)> {
        let session_id = self.peers.get_mut(&peer_id)?.take()?;
        let remaining = self.remove_member(&session_id, peer_id);
        Some((session_id, remaining))
    }

    /// Session a peer belongs to.
    pub fn session_of(&self, peer_id: PeerId) -> Option<&SessionId> {
        self.peers.get(&peer_id)?.as_ref()
    }

    /// Members of a session, in join order.
    pub fn members(&self, session_id: &SessionId) -> &[PeerId] {
        self.sessions.get(session_id).map_or(&[][..], Vec::as_slice)
    }

    /// Whether two distinct peers share a session.
    pub fn same_session(&self, a: PeerId, b: PeerId) -> bool {
        if a == b {
            return false;
        }
        match (self.session_of(a), self.session_of(b)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// Whether a peer is registered.
    pub fn contains_peer(&self, peer_id: PeerId) -> bool {
        self.peers.contains_key(&peer_id)
    }

    /// Whether a session currently exists.
    pub fn contains_session(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of registered connections.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn remove_member(&mut self, session_id: &SessionId, peer_id: PeerId) -> Vec<PeerId> {
        let Some(members) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        members.retain(|&member| member != peer_id);

        let remaining = members.clone();
        if remaining.is_empty() {
            self.sessions.remove(session_id);
        }
        remaining
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(name: &str) -> SessionId {
        SessionId::new(name).unwrap()
    }

    fn registry_with(peers: &[u64]) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        for &raw in peers {
            assert!(registry.register_peer(PeerId::new(raw)));
        }
        registry
    }

    #[test]
    fn register_twice_fails() {
        let mut registry = registry_with(&[1]);
        assert!(!registry.register_peer(PeerId::new(1)));
        assert_eq!(registry.peer_count(), 1);
    }

    #[test]
    fn join_reports_members_in_order() {
        let mut registry = registry_with(&[1, 2]);
        let doc = session("doc");

        assert_eq!(registry.join(PeerId::new(1), &doc).unwrap(), vec![]);
        assert_eq!(registry.join(PeerId::new(2), &doc).unwrap(), vec![PeerId::new(1)]);
        assert_eq!(registry.members(&doc), &[PeerId::new(1), PeerId::new(2)]);
        assert!(registry.same_session(PeerId::new(1), PeerId::new(2)));
    }

    #[test]
    fn third_peer_is_rejected() {
        let mut registry = registry_with(&[1, 2, 3]);
        let doc = session("doc");
        registry.join(PeerId::new(1), &doc).unwrap();
        registry.join(PeerId::new(2), &doc).unwrap();

        let rejection = registry.join(PeerId::new(3), &doc).unwrap_err();
        assert_eq!(rejection.code, Rejection::SESSION_FULL);
        assert_eq!(registry.session_of(PeerId::new(3)), None);
    }

    #[test]
    fn second_join_is_rejected() {
        let mut registry = registry_with(&[1]);
        registry.join(PeerId::new(1), &session("a")).unwrap();

        let rejection = registry.join(PeerId::new(1), &session("b")).unwrap_err();
        assert_eq!(rejection.code, Rejection::ALREADY_JOINED);
        assert!(!registry.contains_session(&session("b")));
    }

    #[test]
    fn leave_frees_the_slot() {
        let mut registry = registry_with(&[1, 2, 3]);
        let doc = session("doc");
        registry.join(PeerId::new(1), &doc).unwrap();
        registry.join(PeerId::new(2), &doc).unwrap();

        let (left, remaining) = registry.leave(PeerId::new(1)).unwrap();
        assert_eq!(left, doc);
        assert_eq!(remaining, vec![PeerId::new(2)]);
        assert_eq!(registry.join(PeerId::new(3), &doc).unwrap(), vec![PeerId::new(2)]);
    }

    #[test]
    fn empty_session_is_removed() {
        let mut registry = registry_with(&[1]);
        let doc = session("doc");
        registry.join(PeerId::new(1), &doc).unwrap();

        let (_, remaining) = registry.unregister_peer(PeerId::new(1)).unwrap().unwrap();
        assert!(remaining.is_empty());
        assert_eq!(registry.session_count(), 0);
        assert!(!registry.contains_peer(PeerId::new(1)));
    }

    #[test]
    fn unregister_unknown_peer() {
        let mut registry = SessionRegistry::new();
        assert!(registry.unregister_peer(PeerId::new(9)).is_none());
    }

    #[test]
    fn peer_is_not_in_session_with_itself() {
        let mut registry = registry_with(&[1]);
        registry.join(PeerId::new(1), &session("doc")).unwrap();
        assert!(!registry.same_session(PeerId::new(1), PeerId::new(1)));
    }
}
