//! Session negotiation state machine.
//!
//! Bootstraps the direct peer channel through the relay. Uses the action
//! pattern: [`Negotiator::handle`] takes an event plus the current time and
//! returns actions for the driver to execute. The negotiation object itself
//! (description and candidate production, the channel) lives behind
//! [`PeerCommand`]s and reports back through [`PeerEvent`]s.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ Joined ┌────────┐ PeerJoined ┌───────────┐        Answer
//! │ Idle │───────>│ Joined │───────────>│ OfferSent │──────────────────┐
//! └──────┘        └────────┘            └───────────┘                  ↓
//!                      │ Offer   ┌───────────────┐ answer ┌──────────┐ ┌───────────┐
//!                      └────────>│ OfferReceived │───────>│ Answered │>│ Connected │
//!                                └───────────────┘        └──────────┘ └───────────┘
//!                                                                            │
//!        any non-terminal ── fatal error ──> Failed         teardown ──> Closed
//! ```
//!
//! The party already present when the second party joins is the initiator.
//! Candidates are applied independently of the description exchange; remote
//! ones that arrive before the remote description are buffered and applied
//! in arrival order right after it.
//!
//! A session the other party ended (it left the relay, or the channel
//! dropped) can be picked up again with [`Negotiator::restart`].

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use cosign_proto::{IceCandidate, PeerId, SessionDescription, SessionId, Signal};

use crate::{
    error::{NegotiationError, RendezvousError},
    event::{
        DescriptionKind, NegotiationAction, NegotiationEvent, PeerCommand, PeerEvent,
        RendezvousEvent,
    },
    rendezvous::RendezvousClient,
};

/// Negotiation role, fixed by join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Already present when the other party joined; sends the offer
    Initiator,
    /// Joined second; answers the offer
    Responder,
}

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Nothing joined yet, or join pending
    Idle,
    /// Join acknowledged, waiting for the other party
    Joined,
    /// Initiator: offer requested or sent, waiting for the answer
    OfferSent,
    /// Responder: offer applied, answer being produced
    OfferReceived,
    /// Responder: answer sent
    Answered,
    /// Description pair established
    Connected,
    /// Torn down
    Closed,
    /// Unrecoverable negotiation error
    Failed,
}

impl NegotiationState {
    /// `Closed` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Offer/answer exchange in progress.
    pub fn is_negotiating(self) -> bool {
        matches!(self, Self::OfferSent | Self::OfferReceived | Self::Answered)
    }
}

/// Negotiator configuration
#[derive(Debug, Clone, Default)]
pub struct NegotiationConfig {
    /// Upper bound from the start of the offer/answer exchange until the
    /// channel opens. `None` waits forever.
    pub negotiation_timeout: Option<Duration>,
}

/// Negotiator for one session attempt.
///
/// Pure state machine: no I/O, time passed in. Generic over `Instant` so the
/// simulation harness can drive it with virtual time.
///
/// A negotiator is single use. After `Closed` or `Failed` every event is
/// ignored; start over with a fresh one.
#[derive(Debug, Clone)]
pub struct Negotiator<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: NegotiationState,
    config: NegotiationConfig,
    rendezvous: RendezvousClient,
    role: Option<PeerRole>,
    remote: Option<PeerId>,
    /// Local description sent to the remote peer
    local_description: bool,
    /// Remote description applied to the negotiation object
    remote_description: bool,
    /// Remote candidates waiting for the remote description
    pending_remote: Vec<IceCandidate>,
    /// Local candidates waiting for a known remote peer
    pending_local: Vec<IceCandidate>,
    /// A negotiation object was created by our commands
    peer_active: bool,
    channel_open: bool,
    connectivity: bool,
    released: bool,
    /// Closed because the other party went away, not by us or the relay
    ended_by_peer: bool,
    /// When the offer/answer exchange started
    negotiation_start: I,
}

impl<I> Negotiator<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a negotiator in [`NegotiationState::Idle`].
    pub fn new(now: I, config: NegotiationConfig) -> Self {
        Self {
            state: NegotiationState::Idle,
            config,
            rendezvous: RendezvousClient::new(),
            role: None,
            remote: None,
            local_description: false,
            remote_description: false,
            pending_remote: Vec::new(),
            pending_local: Vec::new(),
            peer_active: false,
            channel_open: false,
            connectivity: false,
            released: false,
            ended_by_peer: false,
            negotiation_start: now,
        }
    }

    /// Fresh negotiator for the next attempt after the other party ended
    /// the session.
    ///
    /// `None` unless this one is `Closed` because the remote peer left or
    /// the channel dropped. If the relay membership is still held, the
    /// successor starts in `Joined` and offers to whoever joins next;
    /// otherwise it starts in `Idle` and must be sent `Join` again.
    pub fn restart(&self, now: I) -> Option<Self> {
        if self.state != NegotiationState::Closed || !self.ended_by_peer {
            return None;
        }

        let mut next = Self::new(now, self.config.clone());
        if self.rendezvous.is_joined() {
            next.rendezvous = self.rendezvous.clone();
            next.state = NegotiationState::Joined;
        }
        Some(next)
    }

    /// Whether the other party ended the session.
    pub fn ended_by_peer(&self) -> bool {
        self.ended_by_peer
    }

    /// Current state.
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Negotiation role. `None` until the other party is known.
    pub fn role(&self) -> Option<PeerRole> {
        self.role
    }

    /// The other party. `None` until known.
    pub fn remote_peer(&self) -> Option<PeerId> {
        self.remote
    }

    /// Our relay-assigned id. `None` until the join is acknowledged.
    pub fn local_peer(&self) -> Option<PeerId> {
        self.rendezvous.local_id()
    }

    /// Session requested.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.rendezvous.session_id()
    }

    /// Last connectivity value reported through [`NegotiationAction::Connectivity`].
    pub fn is_connected(&self) -> bool {
        self.connectivity
    }

    /// Whether application traffic may be sent on the channel.
    pub fn channel_ready(&self) -> bool {
        self.state == NegotiationState::Connected && self.channel_open
    }

    /// Remote candidates still waiting for the remote description.
    pub fn buffered_candidates(&self) -> usize {
        self.pending_remote.len()
    }

    /// Process an event and return resulting actions.
    ///
    /// Events in a terminal state are ignored. A fatal error moves the
    /// negotiator to [`NegotiationState::Failed`]; call [`Self::abort`] to
    /// release what it holds.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the event does not fit the current state
    /// - `UnexpectedSignal` on a description that contradicts the exchange
    /// - `Rendezvous` if the relay refuses the join
    /// - `RelayLost` if the relay drops before the pair is established
    /// - `PeerFailed` if the negotiation object gives up
    /// - `Timeout` if the configured negotiation timeout elapses
    pub fn handle(
        &mut self,
        event: NegotiationEvent,
        now: I,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state.is_terminal() {
            tracing::debug!(state = ?self.state, ?event, "event ignored in terminal state");
            return Ok(Vec::new());
        }

        let result = self.dispatch(event, now);

        if let Err(error) = &result {
            if error.is_fatal() {
                tracing::warn!(state = ?self.state, %error, "negotiation failed");
                self.state = NegotiationState::Failed;
            }
        }

        result
    }

    /// Tear down from any state.
    ///
    /// Unregisters from the relay, closes the negotiation object and reports
    /// lost connectivity, each only if still held. A non-terminal negotiator
    /// ends in `Closed`; a failed one stays `Failed`.
    pub fn abort(&mut self) -> Vec<NegotiationAction> {
        let actions = self.release(true);
        if !self.state.is_terminal() {
            self.transition(NegotiationState::Closed);
        }
        actions
    }

    fn dispatch(
        &mut self,
        event: NegotiationEvent,
        now: I,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        match event {
            NegotiationEvent::Join { session_id } => self.handle_join(session_id),
            NegotiationEvent::Relay(notice) => match self.rendezvous.handle_notice(notice) {
                Ok(event) => self.handle_rendezvous(event, now),
                Err(RendezvousError::Misaddressed { local_id, target_id }) => {
                    tracing::warn!(%local_id, %target_id, "ignoring misaddressed envelope");
                    Ok(Vec::new())
                },
                Err(e) => Err(e.into()),
            },
            NegotiationEvent::Peer(event) => self.handle_peer(event),
            NegotiationEvent::RelayDisconnected => {
                if self.state == NegotiationState::Connected {
                    tracing::info!("relay disconnected, closing session");
                    Ok(self.close(false))
                } else {
                    Err(NegotiationError::RelayLost)
                }
            },
            NegotiationEvent::Close => Ok(self.close(true)),
            NegotiationEvent::Tick => self.handle_tick(now),
        }
    }

    fn handle_join(
        &mut self,
        session_id: SessionId,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        if self.state != NegotiationState::Idle {
            return Err(NegotiationError::InvalidState { state: self.state, operation: "join" });
        }

        tracing::info!(%session_id, "joining session");
        let request = self.rendezvous.join(session_id)?;
        Ok(vec![NegotiationAction::Relay(request)])
    }

    fn handle_rendezvous(
        &mut self,
        event: RendezvousEvent,
        now: I,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        match event {
            RendezvousEvent::Joined { local_id, session_id, peers } => {
                if self.state != NegotiationState::Idle {
                    return Err(NegotiationError::InvalidState {
                        state: self.state,
                        operation: "accept join",
                    });
                }

                tracing::info!(%session_id, %local_id, present = peers.len(), "joined session");
                self.transition(NegotiationState::Joined);

                if let Some(&first) = peers.first() {
                    self.role = Some(PeerRole::Responder);
                    self.remote = Some(first);
                    self.negotiation_start = now;
                    return self.flush_local();
                }
                Ok(Vec::new())
            },
            RendezvousEvent::PeerJoined(peer_id) => {
                if self.state != NegotiationState::Joined || self.remote.is_some() {
                    tracing::warn!(%peer_id, state = ?self.state, "ignoring extra peer");
                    return Ok(Vec::new());
                }

                tracing::info!(%peer_id, "peer joined, sending offer");
                self.role = Some(PeerRole::Initiator);
                self.remote = Some(peer_id);
                self.peer_active = true;
                self.negotiation_start = now;
                self.transition(NegotiationState::OfferSent);

                Ok(vec![
                    NegotiationAction::Peer(PeerCommand::OpenChannel),
                    NegotiationAction::Peer(PeerCommand::CreateOffer),
                ])
            },
            RendezvousEvent::PeerLeft(peer_id) => {
                if self.remote == Some(peer_id) {
                    // Still a member: the next party to join gets an offer.
                    tracing::info!(%peer_id, "remote peer left");
                    self.ended_by_peer = true;
                    Ok(self.close(false))
                } else {
                    tracing::debug!(%peer_id, "unrelated peer left");
                    Ok(Vec::new())
                }
            },
            RendezvousEvent::Signal { sender_id, signal } => {
                if self.remote != Some(sender_id) {
                    tracing::warn!(%sender_id, kind = %signal.kind(), "ignoring signal from unknown peer");
                    return Ok(Vec::new());
                }
                self.handle_signal(signal)
            },
            RendezvousEvent::Rejected(rejection) => {
                tracing::warn!(code = rejection.code, reason = %rejection.reason, "relay rejected request");
                Ok(Vec::new())
            },
        }
    }

    fn handle_signal(&mut self, signal: Signal) -> Result<Vec<NegotiationAction>, NegotiationError> {
        let kind = signal.kind();
        match (signal, self.role, self.state) {
            (Signal::Offer(offer), Some(PeerRole::Responder), NegotiationState::Joined) => {
                self.peer_active = true;
                self.transition(NegotiationState::OfferReceived);

                let mut actions = self.apply_remote_description(DescriptionKind::Offer, offer);
                actions.push(NegotiationAction::Peer(PeerCommand::CreateAnswer));
                Ok(actions)
            },
            (Signal::Answer(answer), Some(PeerRole::Initiator), NegotiationState::OfferSent)
                if self.local_description =>
            {
                let mut actions = self.apply_remote_description(DescriptionKind::Answer, answer);
                self.transition(NegotiationState::Connected);
                actions.extend(self.report_connectivity());
                Ok(actions)
            },
            (Signal::Candidate(candidate), ..) => {
                if self.remote_description {
                    Ok(vec![NegotiationAction::Peer(PeerCommand::AddCandidate(candidate))])
                } else {
                    tracing::debug!(buffered = self.pending_remote.len() + 1, "buffering early candidate");
                    self.pending_remote.push(candidate);
                    Ok(Vec::new())
                }
            },
            _ => Err(NegotiationError::UnexpectedSignal { state: self.state, kind }),
        }
    }

    fn handle_peer(&mut self, event: PeerEvent) -> Result<Vec<NegotiationAction>, NegotiationError> {
        match event {
            PeerEvent::LocalDescription(description) => self.handle_local_description(description),
            PeerEvent::LocalCandidate(candidate) => {
                self.pending_local.push(candidate);
                self.flush_local()
            },
            PeerEvent::CandidateRejected { candidate, reason } => {
                tracing::warn!(candidate = %candidate.blob, %reason, "candidate rejected");
                Ok(Vec::new())
            },
            PeerEvent::ChannelOpen if !self.peer_active => {
                tracing::debug!(state = ?self.state, "stale channel open ignored");
                Ok(Vec::new())
            },
            PeerEvent::ChannelOpen => {
                tracing::debug!(state = ?self.state, "channel open");
                self.channel_open = true;
                Ok(self.report_connectivity())
            },
            PeerEvent::ChannelClosed => {
                self.channel_open = false;
                if self.state == NegotiationState::Connected {
                    // The other party may still be a member; leaving makes
                    // the relay tell it, so both sides start over.
                    tracing::info!("channel closed");
                    self.ended_by_peer = true;
                    Ok(self.close(true))
                } else {
                    tracing::debug!(state = ?self.state, "channel closed before connection");
                    Ok(Vec::new())
                }
            },
            PeerEvent::Failed { reason } => Err(NegotiationError::PeerFailed { reason }),
        }
    }

    fn handle_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<Vec<NegotiationAction>, NegotiationError> {
        let (remote, signal) = match (self.role, self.state, self.remote) {
            (Some(PeerRole::Initiator), NegotiationState::OfferSent, Some(remote))
                if !self.local_description =>
            {
                (remote, Signal::Offer(description))
            },
            (Some(PeerRole::Responder), NegotiationState::OfferReceived, Some(remote)) => {
                (remote, Signal::Answer(description))
            },
            _ => {
                return Err(NegotiationError::InvalidState {
                    state: self.state,
                    operation: "send local description",
                });
            },
        };

        let mut actions = vec![NegotiationAction::Relay(self.rendezvous.send(remote, signal)?)];
        self.local_description = true;

        if self.state == NegotiationState::OfferReceived {
            self.transition(NegotiationState::Answered);
            // Both descriptions are now set.
            self.transition(NegotiationState::Connected);
            actions.extend(self.report_connectivity());
        }

        actions.extend(self.flush_local()?);
        Ok(actions)
    }

    fn handle_tick(&mut self, now: I) -> Result<Vec<NegotiationAction>, NegotiationError> {
        let Some(timeout) = self.config.negotiation_timeout else {
            return Ok(Vec::new());
        };

        let awaiting_channel = self.state == NegotiationState::Connected && !self.channel_open;
        if self.state.is_negotiating() || awaiting_channel {
            let elapsed = now - self.negotiation_start;
            if elapsed > timeout {
                return Err(NegotiationError::Timeout { elapsed });
            }
        }
        Ok(Vec::new())
    }

    fn apply_remote_description(
        &mut self,
        kind: DescriptionKind,
        description: SessionDescription,
    ) -> Vec<NegotiationAction> {
        self.remote_description = true;

        let mut actions = Vec::with_capacity(1 + self.pending_remote.len());
        actions.push(NegotiationAction::Peer(PeerCommand::SetRemoteDescription { kind, description }));

        if !self.pending_remote.is_empty() {
            tracing::debug!(count = self.pending_remote.len(), "applying buffered candidates");
        }
        actions.extend(
            self.pending_remote
                .drain(..)
                .map(|c| NegotiationAction::Peer(PeerCommand::AddCandidate(c))),
        );
        actions
    }

    /// Send local candidates once the remote peer is known and our
    /// description went out first.
    fn flush_local(&mut self) -> Result<Vec<NegotiationAction>, NegotiationError> {
        let Some(remote) = self.remote else {
            return Ok(Vec::new());
        };
        if !self.local_description {
            return Ok(Vec::new());
        }

        let mut actions = Vec::with_capacity(self.pending_local.len());
        for candidate in std::mem::take(&mut self.pending_local) {
            let request = self.rendezvous.send(remote, Signal::Candidate(candidate))?;
            actions.push(NegotiationAction::Relay(request));
        }
        Ok(actions)
    }

    fn report_connectivity(&mut self) -> Vec<NegotiationAction> {
        if self.channel_ready() && !self.connectivity {
            tracing::info!(remote = ?self.remote, "connected");
            self.connectivity = true;
            vec![NegotiationAction::Connectivity(true)]
        } else {
            Vec::new()
        }
    }

    fn close(&mut self, leave_relay: bool) -> Vec<NegotiationAction> {
        let actions = self.release(leave_relay);
        self.transition(NegotiationState::Closed);
        actions
    }

    fn release(&mut self, leave_relay: bool) -> Vec<NegotiationAction> {
        if self.released {
            return Vec::new();
        }
        self.released = true;

        let mut actions = Vec::new();
        if leave_relay {
            if let Some(request) = self.rendezvous.leave() {
                actions.push(NegotiationAction::Relay(request));
            }
        }
        if self.peer_active {
            actions.push(NegotiationAction::Peer(PeerCommand::Close));
        }
        if self.connectivity {
            self.connectivity = false;
            actions.push(NegotiationAction::Connectivity(false));
        }

        self.channel_open = false;
        self.pending_local.clear();
        self.pending_remote.clear();
        actions
    }

    fn transition(&mut self, next: NegotiationState) {
        tracing::debug!(from = ?self.state, to = ?next, "negotiation state");
        self.state = next;
    }
}
