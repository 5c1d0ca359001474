//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`cosign_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Both participants of a world share one [`SimNetwork`]. Anything that
//! crosses between them (relay notices, channel text) is parked in flight
//! until the world's scheduler delivers it; local events (negotiation object
//! output) go straight to the participant's inbox.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use cosign_app::{App, Driver, DriverEvent};
use cosign_client::PeerCommand;
use cosign_core::env::Environment;
use cosign_proto::{PeerId, RelayNotice, RelayRequest, Signal, Stroke, SyncMessage};
use cosign_relay::RelayConfig;

use crate::{
    SimEnv, SimInstant,
    sim_env::lock,
    sim_peer::{Endpoint, SimPeerNetwork},
    sim_relay::{RelayOutput, SimRelay},
};

/// Error type for simulation driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// An event on its way to a participant.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    /// Recipient
    pub to: Endpoint,
    /// What arrives
    pub event: DriverEvent,
}

impl InFlight {
    /// Candidates may overtake other signaling messages.
    fn is_candidate(&self) -> bool {
        matches!(
            &self.event,
            DriverEvent::Relay(RelayNotice::Signal(envelope)) if matches!(envelope.signal, Signal::Candidate(_))
        )
    }

    fn is_signal(&self) -> bool {
        matches!(self.event, DriverEvent::Relay(RelayNotice::Signal(_)))
    }
}

/// Per-participant I/O state.
#[derive(Debug, Default)]
struct Station {
    relay_reachable: bool,
    relay_peer: Option<PeerId>,
    inbox: VecDeque<DriverEvent>,
    clipboard: Vec<String>,
    renders: usize,
    stopped: bool,
    /// Exited; nothing more is delivered
    retired: bool,
    /// Draws this participant put on the channel
    sent_draws: Vec<(u32, Stroke)>,
}

/// Relay, negotiation objects, and every queue between them.
pub struct SimNetwork {
    relay: SimRelay,
    peers: SimPeerNetwork,
    stations: [Station; 2],
    in_flight: Vec<InFlight>,
    /// Last control value that went over the channel
    last_control_sent: Option<bool>,
}

/// Handle shared by the world and both drivers.
pub type SharedNetwork = Arc<Mutex<SimNetwork>>;

impl SimNetwork {
    /// Network with a reachable relay.
    pub fn new(env: SimEnv, relay: RelayConfig, candidates_per_description: u32) -> Self {
        let station = || Station { relay_reachable: true, ..Station::default() };
        Self {
            relay: SimRelay::new(env, relay),
            peers: SimPeerNetwork::new(candidates_per_description),
            stations: [station(), station()],
            in_flight: Vec::new(),
            last_control_sent: None,
        }
    }

    /// Wrap for sharing.
    pub fn shared(self) -> SharedNetwork {
        Arc::new(Mutex::new(self))
    }

    /// Make the relay refuse (or accept) `endpoint`'s connection attempts.
    pub fn set_relay_reachable(&mut self, endpoint: Endpoint, reachable: bool) {
        self.stations[endpoint].relay_reachable = reachable;
    }

    /// Put an event straight into a participant's inbox.
    pub fn inject(&mut self, endpoint: Endpoint, event: DriverEvent) {
        if !self.stations[endpoint].retired {
            self.stations[endpoint].inbox.push_back(event);
        }
    }

    /// Drop `endpoint`'s relay connection. Both ends notice.
    pub fn drop_relay(&mut self, endpoint: Endpoint) {
        let Some(peer_id) = self.stations[endpoint].relay_peer.take() else {
            return;
        };
        if let Err(e) = self.relay.disconnect(peer_id, "connection lost") {
            tracing::warn!(error = %e, "relay disconnect");
        }
        self.inject(endpoint, DriverEvent::RelayClosed);
        self.route_relay_outputs();
    }

    /// Forget a participant that has exited: its relay connection closes
    /// silently and nothing more is delivered to it.
    pub fn retire(&mut self, endpoint: Endpoint) {
        if let Some(peer_id) = self.stations[endpoint].relay_peer.take() {
            if let Err(e) = self.relay.disconnect(peer_id, "client exited") {
                tracing::warn!(error = %e, "relay disconnect");
            }
            self.route_relay_outputs();
        }
        self.stations[endpoint].retired = true;
        self.stations[endpoint].inbox.clear();
        self.in_flight.retain(|item| item.to != endpoint);
    }

    /// Bring an exited participant back as a freshly started process.
    pub fn revive(&mut self, endpoint: Endpoint) {
        let station = &mut self.stations[endpoint];
        station.retired = false;
        station.stopped = false;
        station.inbox.clear();
        station.sent_draws.clear();
        self.peers.reset(endpoint);
    }

    /// Whether `endpoint` has unprocessed input.
    pub fn has_input(&self, endpoint: Endpoint) -> bool {
        !self.stations[endpoint].inbox.is_empty()
    }

    /// Events still in flight.
    pub fn in_flight(&self) -> &[InFlight] {
        &self.in_flight
    }

    /// Indices of in-flight events that may be delivered next.
    ///
    /// Each recipient's queue is FIFO. With `reorder_candidates`, a candidate
    /// may also overtake the signaling messages queued ahead of it, which is
    /// how it ends up arriving before the description it belongs to.
    pub fn deliverable(&self, reorder_candidates: bool) -> Vec<usize> {
        let mut heads_seen = [false; 2];
        let mut only_signals_ahead = [true; 2];
        let mut result = Vec::new();

        for (index, item) in self.in_flight.iter().enumerate() {
            let to = item.to;
            if !heads_seen[to] {
                heads_seen[to] = true;
                result.push(index);
            } else if reorder_candidates && only_signals_ahead[to] && item.is_candidate() {
                result.push(index);
            }
            only_signals_ahead[to] &= item.is_signal();
        }
        result
    }

    /// Move one in-flight event into its recipient's inbox.
    pub fn deliver(&mut self, index: usize) {
        if index < self.in_flight.len() {
            let item = self.in_flight.remove(index);
            self.stations[item.to].inbox.push_back(item.event);
        }
    }

    /// Nothing in flight and no participant has input.
    pub fn is_quiet(&self) -> bool {
        self.in_flight.is_empty() && self.stations.iter().all(|s| s.inbox.is_empty())
    }

    /// Invite references copied by `endpoint`.
    pub fn clipboard(&self, endpoint: Endpoint) -> &[String] {
        &self.stations[endpoint].clipboard
    }

    /// Number of renders requested by `endpoint`.
    pub fn renders(&self, endpoint: Endpoint) -> usize {
        self.stations[endpoint].renders
    }

    /// Whether `endpoint`'s driver was stopped.
    pub fn is_stopped(&self, endpoint: Endpoint) -> bool {
        self.stations[endpoint].stopped
    }

    /// Draws `endpoint` put on the channel, in order.
    pub fn sent_draws(&self, endpoint: Endpoint) -> &[(u32, Stroke)] {
        &self.stations[endpoint].sent_draws
    }

    /// Last control value that went over the channel.
    pub fn last_control_sent(&self) -> Option<bool> {
        self.last_control_sent
    }

    /// Whether `endpoint`'s channel is open.
    pub fn channel_open(&self, endpoint: Endpoint) -> bool {
        self.peers.is_open(endpoint)
    }

    /// The relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    fn endpoint_of(&self, peer_id: PeerId) -> Option<Endpoint> {
        self.stations.iter().position(|s| s.relay_peer == Some(peer_id))
    }

    fn route_relay_outputs(&mut self) {
        for (peer_id, output) in self.relay.take_outputs() {
            let Some(to) = self.endpoint_of(peer_id) else {
                tracing::debug!(%peer_id, ?output, "relay output for departed connection");
                continue;
            };
            let event = match output {
                RelayOutput::Notice(notice) => DriverEvent::Relay(notice),
                RelayOutput::Closed => {
                    self.stations[to].relay_peer = None;
                    DriverEvent::RelayClosed
                },
            };
            self.send(to, event);
        }
    }

    fn send(&mut self, to: Endpoint, event: DriverEvent) {
        if !self.stations[to].retired {
            self.in_flight.push(InFlight { to, event });
        }
    }

    /// The channel is gone: text still travelling on it is lost, and what
    /// went over it no longer has to arrive anywhere.
    fn discard_channel(&mut self) {
        self.in_flight.retain(|item| !matches!(item.event, DriverEvent::Channel(_)));
        for station in &mut self.stations {
            station.inbox.retain(|event| !matches!(event, DriverEvent::Channel(_)));
            station.sent_draws.clear();
        }
        self.last_control_sent = None;
    }

    fn record_sent(&mut self, from: Endpoint, text: &str) {
        match SyncMessage::decode(text) {
            Ok(SyncMessage::Draw { point, page }) => self.stations[from].sent_draws.push((page, point)),
            Ok(SyncMessage::Control { enabled }) => self.last_control_sent = Some(enabled),
            Ok(SyncMessage::PageChange { .. }) | Err(_) => {},
        }
    }
}

/// Simulation driver for one participant.
pub struct SimDriver {
    endpoint: Endpoint,
    network: SharedNetwork,
    env: SimEnv,
}

impl SimDriver {
    /// Driver for `endpoint` on a shared network.
    pub fn new(endpoint: Endpoint, network: SharedNetwork, env: SimEnv) -> Self {
        Self { endpoint, network, env }
    }

    /// Which participant this driver serves.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn network(&self) -> MutexGuard<'_, SimNetwork> {
        lock(&self.network)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        let endpoint = self.endpoint;
        Ok(self.network().stations[endpoint].inbox.pop_front())
    }

    async fn connect_relay(&mut self, addr: &str) -> Result<(), Self::Error> {
        let endpoint = self.endpoint;
        let mut network = self.network();

        if !network.stations[endpoint].relay_reachable {
            return Err(SimDriverError(format!("{addr}: connection refused")));
        }

        let peer_id = network.relay.connect().map_err(|e| SimDriverError(e.to_string()))?;
        network.stations[endpoint].relay_peer = Some(peer_id);
        network.route_relay_outputs();
        Ok(())
    }

    async fn send_relay(&mut self, request: RelayRequest) -> Result<(), Self::Error> {
        let endpoint = self.endpoint;
        let mut network = self.network();

        let peer_id = network.stations[endpoint]
            .relay_peer
            .ok_or_else(|| SimDriverError("relay connection closed".to_string()))?;
        network.relay.request(peer_id, request).map_err(|e| SimDriverError(e.to_string()))?;
        network.route_relay_outputs();
        Ok(())
    }

    fn execute_peer(&mut self, command: PeerCommand) -> Result<(), Self::Error> {
        let endpoint = self.endpoint;
        let mut network = self.network();

        if command == PeerCommand::Close {
            network.discard_channel();
        }
        for (to, event) in network.peers.execute(endpoint, command) {
            network.inject(to, DriverEvent::Peer(event));
        }
        Ok(())
    }

    fn send_channel(&mut self, text: String) -> Result<(), Self::Error> {
        let endpoint = self.endpoint;
        let mut network = self.network();

        let to = network
            .peers
            .channel_target(endpoint)
            .ok_or_else(|| SimDriverError("channel closed".to_string()))?;
        network.record_sent(endpoint, &text);
        network.send(to, DriverEvent::Channel(text));
        Ok(())
    }

    fn copy_to_clipboard(&mut self, text: &str) -> Result<(), Self::Error> {
        let endpoint = self.endpoint;
        self.network().stations[endpoint].clipboard.push(text.to_string());
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, _app: &App) -> Result<(), Self::Error> {
        let endpoint = self.endpoint;
        self.network().stations[endpoint].renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let endpoint = self.endpoint;
        self.network().stations[endpoint].stopped = true;
    }
}
