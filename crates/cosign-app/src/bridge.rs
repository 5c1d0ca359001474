//! Session-to-application translation layer.
//!
//! The [`Bridge`] wraps the [`Negotiator`] and the sync codec and adapts them
//! to the application lifecycle.
//!
//! # Responsibilities
//!
//! - Feeds relay notices, negotiation-object events, and ticks into the
//!   negotiator.
//! - Accumulates outgoing relay requests, peer commands, and channel text
//!   for the driver to execute in the next I/O cycle.
//! - Encodes local [`SyncMessage`]s only while the channel is ready; decodes
//!   incoming text leniently, dropping what does not parse.
//! - Interprets negotiator results and converts them into [`AppEvent`]s.
//!   A fatal negotiation error is surfaced once and the session is torn down.
//! - Starts a fresh negotiation when the other party ends the session, so a
//!   returning peer can pair again without the local side relaunching.

use std::{ops::Sub, time::Duration};

use cosign_client::{
    NegotiationAction, NegotiationConfig, NegotiationError, NegotiationEvent, NegotiationState,
    Negotiator, PeerCommand, PeerEvent,
};
use cosign_proto::{RelayNotice, RelayRequest, SessionId, SyncMessage};

use crate::AppEvent;

/// Bridge between App and the negotiation layer.
///
/// Generic over the instant type so the simulation harness can drive it with
/// virtual time.
pub struct Bridge<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    negotiator: Negotiator<I>,
    session_id: SessionId,
    relay_out: Vec<RelayRequest>,
    peer_out: Vec<PeerCommand>,
    channel_out: Vec<String>,
    /// State last reported to the App
    reported: NegotiationState,
}

impl<I> Bridge<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a bridge for `session_id`. Nothing happens until [`Self::start`].
    pub fn new(session_id: SessionId, config: NegotiationConfig, now: I) -> Self {
        Self {
            negotiator: Negotiator::new(now, config),
            session_id,
            relay_out: Vec::new(),
            peer_out: Vec::new(),
            channel_out: Vec::new(),
            reported: NegotiationState::Idle,
        }
    }

    /// Join the session on the relay.
    pub fn start(&mut self, now: I) -> Vec<AppEvent> {
        let session_id = self.session_id.clone();
        self.drive(NegotiationEvent::Join { session_id }, now)
    }

    /// Handle a notice from the relay.
    pub fn handle_relay_notice(&mut self, notice: RelayNotice, now: I) -> Vec<AppEvent> {
        self.drive(NegotiationEvent::Relay(notice), now)
    }

    /// The relay connection is gone (or never came up).
    pub fn handle_relay_closed(&mut self, now: I) -> Vec<AppEvent> {
        self.drive(NegotiationEvent::RelayDisconnected, now)
    }

    /// Handle an event from the negotiation object.
    pub fn handle_peer_event(&mut self, event: PeerEvent, now: I) -> Vec<AppEvent> {
        self.drive(NegotiationEvent::Peer(event), now)
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: I) -> Vec<AppEvent> {
        self.drive(NegotiationEvent::Tick, now)
    }

    /// Tear the session down: leave the relay and close the channel.
    pub fn close(&mut self, now: I) -> Vec<AppEvent> {
        self.drive(NegotiationEvent::Close, now)
    }

    /// Decode text received on the channel.
    ///
    /// Malformed or unknown messages are dropped with a debug log and never
    /// reach the App.
    pub fn handle_channel_text(&mut self, text: &str) -> Vec<AppEvent> {
        match SyncMessage::decode(text) {
            Ok(message) => vec![AppEvent::Remote(message)],
            Err(e) => {
                tracing::debug!(error = %e, len = text.len(), "dropping channel message");
                vec![]
            },
        }
    }

    /// Queue a local message for the peer.
    ///
    /// Sent only while the channel is ready. Otherwise dropped: there is no
    /// queueing or replay of local mutations made while disconnected.
    pub fn broadcast(&mut self, message: &SyncMessage) {
        if !self.negotiator.channel_ready() {
            tracing::debug!(kind = message.kind(), "channel not ready, not sending");
            return;
        }

        match message.encode() {
            Ok(text) => self.channel_out.push(text),
            Err(e) => tracing::warn!(error = %e, "failed to encode sync message"),
        }
    }

    /// Take pending relay requests.
    pub fn take_relay_requests(&mut self) -> Vec<RelayRequest> {
        std::mem::take(&mut self.relay_out)
    }

    /// Take pending commands for the negotiation object.
    pub fn take_peer_commands(&mut self) -> Vec<PeerCommand> {
        std::mem::take(&mut self.peer_out)
    }

    /// Take pending channel text.
    pub fn take_channel_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.channel_out)
    }

    /// Current negotiation state.
    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiator.state()
    }

    /// Whether application traffic is being sent.
    pub fn channel_ready(&self) -> bool {
        self.negotiator.channel_ready()
    }

    /// The negotiator, for inspection.
    pub fn negotiator(&self) -> &Negotiator<I> {
        &self.negotiator
    }

    fn drive(&mut self, event: NegotiationEvent, now: I) -> Vec<AppEvent> {
        let result = self.negotiator.handle(event, now);
        let mut events = self.handle_result(result);

        if let Some(next) = self.negotiator.restart(now) {
            tracing::info!("session ended by peer, waiting for it to return");
            self.negotiator = next;
            events.push(AppEvent::SessionRestarted);

            if self.negotiator.state() == NegotiationState::Idle {
                let session_id = self.session_id.clone();
                let result = self.negotiator.handle(NegotiationEvent::Join { session_id }, now);
                events.extend(self.handle_result(result));
            }
        }

        let state = self.negotiator.state();
        if state != self.reported {
            self.reported = state;
            events.push(AppEvent::Negotiation(state));
        }
        events
    }

    fn handle_result(
        &mut self,
        result: Result<Vec<NegotiationAction>, NegotiationError>,
    ) -> Vec<AppEvent> {
        match result {
            Ok(actions) => self.process_actions(actions),
            Err(e) if e.is_fatal() => {
                tracing::warn!(error = %e, "session negotiation failed");
                let cleanup = self.negotiator.abort();
                let mut events = vec![AppEvent::Error { message: e.to_string() }];
                events.extend(self.process_actions(cleanup));
                events
            },
            Err(e) => {
                tracing::warn!(error = %e, "negotiation event rejected");
                vec![]
            },
        }
    }

    fn process_actions(&mut self, actions: Vec<NegotiationAction>) -> Vec<AppEvent> {
        let mut events = Vec::new();

        for action in actions {
            match action {
                NegotiationAction::Relay(request) => self.relay_out.push(request),
                NegotiationAction::Peer(command) => self.peer_out.push(command),
                NegotiationAction::Connectivity(connected) => {
                    events.push(AppEvent::Connectivity(connected));
                },
            }
        }

        events
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use cosign_client::DescriptionKind;
    use cosign_proto::{PeerId, Point, Rejection, SessionDescription, Signal, SignalingEnvelope, Stroke};

    use super::*;

    const LOCAL: PeerId = PeerId::new(0xA);
    const REMOTE: PeerId = PeerId::new(0xB);

    fn bridge() -> Bridge<Instant> {
        Bridge::new(SessionId::new("doc").unwrap(), NegotiationConfig::default(), Instant::now())
    }

    fn joined(peers: Vec<PeerId>) -> RelayNotice {
        RelayNotice::Joined { peer_id: LOCAL, session_id: SessionId::new("doc").unwrap(), peers }
    }

    /// Responder path up to an open channel.
    fn connected_bridge() -> Bridge<Instant> {
        let now = Instant::now();
        let mut bridge = bridge();
        bridge.start(now);
        bridge.handle_relay_notice(joined(vec![REMOTE]), now);
        bridge.handle_relay_notice(
            RelayNotice::Signal(SignalingEnvelope {
                sender_id: REMOTE,
                target_id: LOCAL,
                signal: Signal::Offer(SessionDescription::new("offer")),
            }),
            now,
        );
        bridge.handle_peer_event(PeerEvent::LocalDescription(SessionDescription::new("answer")), now);
        bridge.handle_peer_event(PeerEvent::ChannelOpen, now);
        bridge.take_relay_requests();
        bridge.take_peer_commands();
        bridge
    }

    fn draw() -> SyncMessage {
        SyncMessage::Draw {
            point: Stroke::new(Point::new(0.0, 0.0), Point::new(1.0, 1.0), "red", 2.0),
            page: 0,
        }
    }

    #[test]
    fn start_queues_join() {
        let mut bridge = bridge();
        bridge.start(Instant::now());

        assert_eq!(bridge.take_relay_requests(), vec![RelayRequest::Join {
            session_id: SessionId::new("doc").unwrap()
        }]);
    }

    #[test]
    fn responder_reaches_connectivity() {
        let now = Instant::now();
        let mut bridge = bridge();
        bridge.start(now);
        bridge.handle_relay_notice(joined(vec![REMOTE]), now);

        let events = bridge.handle_relay_notice(
            RelayNotice::Signal(SignalingEnvelope {
                sender_id: REMOTE,
                target_id: LOCAL,
                signal: Signal::Offer(SessionDescription::new("offer")),
            }),
            now,
        );
        assert!(events.contains(&AppEvent::Negotiation(NegotiationState::OfferReceived)));
        assert!(bridge.take_peer_commands().iter().any(|c| matches!(c, PeerCommand::SetRemoteDescription {
            kind: DescriptionKind::Offer,
            ..
        })));

        bridge.handle_peer_event(PeerEvent::LocalDescription(SessionDescription::new("answer")), now);
        let events = bridge.handle_peer_event(PeerEvent::ChannelOpen, now);
        assert!(events.contains(&AppEvent::Connectivity(true)));
        assert!(bridge.channel_ready());
    }

    #[test]
    fn broadcast_before_ready_is_dropped() {
        let mut bridge = bridge();
        bridge.broadcast(&draw());
        assert!(bridge.take_channel_messages().is_empty());
    }

    #[test]
    fn broadcast_when_ready_is_encoded() {
        let mut bridge = connected_bridge();
        bridge.broadcast(&SyncMessage::PageChange { page: 2 });

        assert_eq!(bridge.take_channel_messages(), vec![r#"{"type":"page-change","page":2}"#.to_string()]);
    }

    #[test]
    fn channel_text_is_decoded_leniently() {
        let mut bridge = connected_bridge();

        assert_eq!(bridge.handle_channel_text(r#"{"type":"control","enabled":true}"#), vec![
            AppEvent::Remote(SyncMessage::Control { enabled: true })
        ]);
        assert!(bridge.handle_channel_text(r#"{"type":"clear"}"#).is_empty());
        assert!(bridge.handle_channel_text("not json").is_empty());
    }

    #[test]
    fn join_rejection_surfaces_error_once() {
        let now = Instant::now();
        let mut bridge = bridge();
        bridge.start(now);
        bridge.take_relay_requests();

        let events = bridge.handle_relay_notice(RelayNotice::Rejected(Rejection::capacity()), now);
        assert!(matches!(events[0], AppEvent::Error { .. }));
        assert!(events.contains(&AppEvent::Negotiation(NegotiationState::Failed)));

        // Terminal: later notices are ignored.
        assert!(bridge.handle_relay_notice(joined(vec![]), now).is_empty());
    }

    #[test]
    fn close_leaves_and_closes_channel() {
        let mut bridge = connected_bridge();
        let events = bridge.close(Instant::now());

        assert!(events.contains(&AppEvent::Connectivity(false)));
        assert!(events.contains(&AppEvent::Negotiation(NegotiationState::Closed)));
        assert_eq!(bridge.take_relay_requests(), vec![RelayRequest::Leave]);
        assert_eq!(bridge.take_peer_commands(), vec![PeerCommand::Close]);
    }

    #[test]
    fn remote_leaving_restarts_without_leaving_the_relay() {
        let now = Instant::now();
        let mut bridge = connected_bridge();

        let events = bridge.handle_relay_notice(RelayNotice::PeerLeft { peer_id: REMOTE }, now);
        assert_eq!(events, vec![
            AppEvent::Connectivity(false),
            AppEvent::SessionRestarted,
            AppEvent::Negotiation(NegotiationState::Joined),
        ]);
        assert!(bridge.take_relay_requests().is_empty());
        assert_eq!(bridge.take_peer_commands(), vec![PeerCommand::Close]);

        // The returning party is offered a new channel.
        let returning = PeerId::new(0xC);
        bridge.handle_relay_notice(RelayNotice::PeerJoined { peer_id: returning }, now);
        assert_eq!(bridge.negotiation_state(), NegotiationState::OfferSent);
        assert_eq!(bridge.take_peer_commands(), vec![PeerCommand::OpenChannel, PeerCommand::CreateOffer]);
    }

    #[test]
    fn channel_drop_rejoins_the_session() {
        let now = Instant::now();
        let mut bridge = connected_bridge();

        let events = bridge.handle_peer_event(PeerEvent::ChannelClosed, now);
        assert!(events.contains(&AppEvent::SessionRestarted));
        assert!(!events.contains(&AppEvent::Negotiation(NegotiationState::Closed)));
        assert_eq!(bridge.negotiation_state(), NegotiationState::Idle);
        assert_eq!(bridge.take_relay_requests(), vec![
            RelayRequest::Leave,
            RelayRequest::Join { session_id: SessionId::new("doc").unwrap() },
        ]);

        bridge.handle_relay_notice(joined(vec![REMOTE]), now);
        assert_eq!(bridge.negotiation_state(), NegotiationState::Joined);
    }

    #[test]
    fn relay_loss_after_connect_does_not_restart() {
        let mut bridge = connected_bridge();
        let events = bridge.handle_relay_closed(Instant::now());

        assert!(!events.contains(&AppEvent::SessionRestarted));
        assert_eq!(bridge.negotiation_state(), NegotiationState::Closed);
    }

    #[test]
    fn relay_loss_before_pairing_fails_session() {
        let now = Instant::now();
        let mut bridge = bridge();
        bridge.start(now);
        bridge.handle_relay_notice(joined(vec![]), now);

        let events = bridge.handle_relay_closed(now);
        assert!(matches!(events[0], AppEvent::Error { .. }));
        assert_eq!(bridge.negotiation_state(), NegotiationState::Failed);
    }
}
