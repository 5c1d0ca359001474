//! In-memory negotiation objects for the two sides of a session.
//!
//! Models just enough of a real negotiation object to exercise the
//! negotiator: descriptions produce candidates, a candidate applied before
//! the remote description is refused, and the channel opens once both sides
//! hold both descriptions and at least one candidate got through. Closing
//! an object returns it to idle so it can negotiate again.

use cosign_client::{DescriptionKind, PeerCommand, PeerEvent};
use cosign_proto::{IceCandidate, SessionDescription};

/// Index of a participant in a two-party world.
pub type Endpoint = usize;

#[derive(Debug, Default)]
struct SimPeer {
    local_description: bool,
    remote_description: bool,
    candidates_applied: usize,
    candidates_produced: u32,
    open: bool,
}

/// Paired negotiation objects of endpoint 0 and endpoint 1.
#[derive(Debug)]
pub struct SimPeerNetwork {
    peers: [SimPeer; 2],
    candidates_per_description: u32,
}

impl SimPeerNetwork {
    /// Each description is followed by `candidates_per_description` local
    /// candidates. With zero, the channel never opens.
    pub fn new(candidates_per_description: u32) -> Self {
        Self { peers: Default::default(), candidates_per_description }
    }

    /// Execute `command` on `endpoint`'s object.
    ///
    /// Returns the events it causes, addressed to the endpoint that observes
    /// them (the far side observes channel open and close).
    pub fn execute(&mut self, endpoint: Endpoint, command: PeerCommand) -> Vec<(Endpoint, PeerEvent)> {
        let mut events = Vec::new();
        match command {
            PeerCommand::OpenChannel => {},
            PeerCommand::CreateOffer => self.describe(endpoint, DescriptionKind::Offer, &mut events),
            PeerCommand::CreateAnswer => self.describe(endpoint, DescriptionKind::Answer, &mut events),
            PeerCommand::SetRemoteDescription { .. } => self.peers[endpoint].remote_description = true,
            PeerCommand::AddCandidate(candidate) => {
                let peer = &mut self.peers[endpoint];
                if peer.remote_description {
                    peer.candidates_applied += 1;
                } else {
                    events.push((endpoint, PeerEvent::CandidateRejected {
                        candidate,
                        reason: "remote description not set".to_string(),
                    }));
                }
            },
            PeerCommand::Close => {
                let far = other(endpoint);
                if self.peers[endpoint].open {
                    self.peers[far].open = false;
                    events.push((far, PeerEvent::ChannelClosed));
                }
                self.peers[endpoint] = SimPeer::default();
            },
        }

        if self.ready_to_open() {
            self.peers[0].open = true;
            self.peers[1].open = true;
            events.push((0, PeerEvent::ChannelOpen));
            events.push((1, PeerEvent::ChannelOpen));
        }

        events
    }

    /// Where text sent by `endpoint` goes, if its channel is open.
    pub fn channel_target(&self, endpoint: Endpoint) -> Option<Endpoint> {
        self.peers[endpoint].open.then_some(other(endpoint))
    }

    /// Return `endpoint`'s object to idle without telling the far side.
    pub fn reset(&mut self, endpoint: Endpoint) {
        self.peers[endpoint] = SimPeer::default();
    }

    /// Whether `endpoint`'s channel is open.
    pub fn is_open(&self, endpoint: Endpoint) -> bool {
        self.peers[endpoint].open
    }

    fn describe(&mut self, endpoint: Endpoint, kind: DescriptionKind, events: &mut Vec<(Endpoint, PeerEvent)>) {
        let blob = match kind {
            DescriptionKind::Offer => r#"{"kind":"offer"}"#,
            DescriptionKind::Answer => r#"{"kind":"answer"}"#,
        };
        events.push((endpoint, PeerEvent::LocalDescription(SessionDescription::new(blob))));

        let peer = &mut self.peers[endpoint];
        peer.local_description = true;
        for _ in 0..self.candidates_per_description {
            let n = peer.candidates_produced;
            peer.candidates_produced += 1;
            let candidate = IceCandidate::new(format!("sim {endpoint} {n}"));
            events.push((endpoint, PeerEvent::LocalCandidate(candidate)));
        }
    }

    fn ready_to_open(&self) -> bool {
        let [a, b] = &self.peers;
        let described = |p: &SimPeer| p.local_description && p.remote_description;

        !a.open && described(a) && described(b) && a.candidates_applied + b.candidates_applied > 0
    }
}

fn other(endpoint: Endpoint) -> Endpoint {
    1 - endpoint
}
